use anyhow::{anyhow, Result};
use std::time::Duration;

mod openai;
pub(crate) mod retry;

pub use openai::{ChatOptions, Completion, ImageRequest, OpenAI, ProviderUsage};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings shared by every model call.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub key: String,
    pub base_url: String,
    pub timeout: Option<Duration>,
    pub max_retries: usize,
}

impl ServiceConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            max_retries: retry::RATE_LIMIT_MAX_RETRIES,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.base_url = trimmed.to_string();
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|value| !value.is_zero());
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone)]
pub enum MessagePart {
    Text(String),
    Image { mime: String, bytes: Vec<u8> },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            parts: vec![MessagePart::Text(content.into())],
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::Text(content.into())],
        }
    }

    pub fn user_with_image(content: impl Into<String>, mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![
                MessagePart::Text(content.into()),
                MessagePart::Image {
                    mime: mime.to_string(),
                    bytes,
                },
            ],
        }
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, MessagePart::Image { .. }))
    }
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|value| !value.trim().is_empty()) {
        return Ok(key.trim().to_string());
    }
    get_env("OPENAI_API_KEY").ok_or_else(|| anyhow!("no API key found (checked OPENAI_API_KEY)"))
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Drops a surrounding Markdown code fence (```svg ... ```) from a reply.
pub fn strip_markdown_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_language_tag() {
        assert_eq!(strip_markdown_fence("```svg\n<svg/>\n```"), "<svg/>");
        assert_eq!(strip_markdown_fence("  <svg/>  "), "<svg/>");
        assert_eq!(strip_markdown_fence("```\n{}\n```\n"), "{}");
    }

    #[test]
    fn service_config_normalizes_inputs() {
        let config = ServiceConfig::new("k")
            .with_base_url("http://localhost:8080/v1/")
            .with_timeout(Some(Duration::ZERO))
            .with_max_retries(0);
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_retries, 1);
    }
}
