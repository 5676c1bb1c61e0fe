use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

use super::retry::{is_rate_limited, retry_after, wait_with_backoff, RATE_LIMIT_BASE_DELAY};
use super::{Message, MessagePart, MessageRole, ServiceConfig};

pub(crate) const DEFAULT_MODEL: &str = "gpt-4.1-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    config: ServiceConfig,
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_object: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone)]
pub struct ImageRequest<'a> {
    pub prompt: &'a str,
    pub size: &'a str,
    pub quality: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
enum ImagePayload {
    Base64(String),
    Url(String),
}

impl OpenAI {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            model: DEFAULT_MODEL.to_string(),
            messages: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn append_system_input(mut self, input: impl Into<String>) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    pub fn append_user_input(mut self, input: impl Into<String>) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    pub fn append_user_image(mut self, text: impl Into<String>, mime: &str, bytes: Vec<u8>) -> Self {
        self.messages.push(Message::user_with_image(text, mime, bytes));
        self
    }

    /// Runs a chat completion over the queued messages and returns the
    /// assistant text.
    pub async fn complete(self, stage: &str, options: ChatOptions) -> Result<Completion> {
        let client = http_client(&self.config)?;
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = chat_body(&self.model, &self.messages, &options);
        let request_bytes = body.to_string().len();
        info!(
            "{}: calling {} (request {} bytes, images: {})",
            stage,
            self.model,
            request_bytes,
            self.messages.iter().any(Message::has_image)
        );

        let started = Instant::now();
        let text = send_with_retry(stage, self.config.max_retries, || {
            Ok(client
                .post(&url)
                .bearer_auth(&self.config.key)
                .json(&body))
        })
        .await
        .inspect_err(|err| {
            warn!(
                "{}: {} failed after {:.2}s: {}",
                stage,
                self.model,
                started.elapsed().as_secs_f32(),
                err
            )
        })?;
        info!(
            "{}: response received in {:.2}s ({} bytes)",
            stage,
            started.elapsed().as_secs_f32(),
            text.len()
        );
        extract_completion(&text, &self.model)
    }

    pub async fn generate_image(&self, stage: &str, request: ImageRequest<'_>) -> Result<Vec<u8>> {
        let client = http_client(&self.config)?;
        let url = format!("{}/images/generations", self.config.base_url);
        let mut body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "size": request.size,
            "n": 1,
        });
        if let Some(quality) = request.quality {
            body["quality"] = json!(quality);
        }
        info!(
            "{}: generating image with {} ({} prompt bytes)",
            stage,
            self.model,
            request.prompt.len()
        );

        let started = Instant::now();
        let text = send_with_retry(stage, self.config.max_retries, || {
            Ok(client
                .post(&url)
                .bearer_auth(&self.config.key)
                .json(&body))
        })
        .await?;
        let bytes = resolve_image_payload(&client, extract_image_payload(&text)?).await?;
        info!(
            "{}: image received in {:.2}s ({} bytes)",
            stage,
            started.elapsed().as_secs_f32(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Masked edit: opaque mask pixels are repainted, transparent ones kept.
    pub async fn edit_image(
        &self,
        stage: &str,
        image_png: &[u8],
        mask_png: &[u8],
        request: ImageRequest<'_>,
    ) -> Result<Vec<u8>> {
        let client = http_client(&self.config)?;
        let url = format!("{}/images/edits", self.config.base_url);
        info!(
            "{}: editing image with {} (image {} bytes, mask {} bytes)",
            stage,
            self.model,
            image_png.len(),
            mask_png.len()
        );

        let started = Instant::now();
        let text = send_with_retry(stage, self.config.max_retries, || {
            let image = Part::bytes(image_png.to_vec())
                .file_name("image.png")
                .mime_str("image/png")?;
            let mask = Part::bytes(mask_png.to_vec())
                .file_name("mask.png")
                .mime_str("image/png")?;
            let mut form = Form::new()
                .text("model", self.model.clone())
                .text("prompt", request.prompt.to_string())
                .text("n", "1")
                .text("size", request.size.to_string())
                .part("image", image)
                .part("mask", mask);
            if let Some(quality) = request.quality {
                form = form.text("quality", quality.to_string());
            }
            Ok(client
                .post(&url)
                .bearer_auth(&self.config.key)
                .multipart(form))
        })
        .await?;
        let bytes = resolve_image_payload(&client, extract_image_payload(&text)?).await?;
        info!(
            "{}: edited image received in {:.2}s ({} bytes)",
            stage,
            started.elapsed().as_secs_f32(),
            bytes.len()
        );
        Ok(bytes)
    }
}

fn http_client(config: &ServiceConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().with_context(|| "failed to build HTTP client")
}

async fn send_with_retry<F>(stage: &str, max_retries: usize, build: F) -> Result<String>
where
    F: Fn() -> Result<reqwest::RequestBuilder>,
{
    let mut attempt = 0usize;
    let mut delay = RATE_LIMIT_BASE_DELAY;
    loop {
        attempt += 1;
        let response = build()?
            .send()
            .await
            .with_context(|| format!("{}: request failed", stage))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(text);
        }
        if is_rate_limited(status, &text) && attempt < max_retries {
            delay = wait_with_backoff(stage, attempt, max_retries, delay, retry_after).await;
            continue;
        }
        return Err(anyhow!(
            "OpenAI API error ({}): {}",
            status,
            extract_openai_error(&text).unwrap_or(text)
        ));
    }
}

fn chat_body(model: &str, messages: &[Message], options: &ChatOptions) -> Value {
    let messages = messages
        .iter()
        .map(|message| {
            let role = match message.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
            };
            if !message.has_image() {
                let content = message
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        MessagePart::Text(text) => Some(text.as_str()),
                        MessagePart::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                return json!({"role": role, "content": content});
            }
            let parts = message
                .parts
                .iter()
                .map(|part| match part {
                    MessagePart::Text(text) => json!({"type": "text", "text": text}),
                    MessagePart::Image { mime, bytes } => {
                        let url = format!("data:{};base64,{}", mime, BASE64.encode(bytes));
                        json!({"type": "image_url", "image_url": {"url": url}})
                    }
                })
                .collect::<Vec<_>>();
            json!({"role": role, "content": parts})
        })
        .collect::<Vec<_>>();

    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if options.json_object {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

fn extract_completion(text: &str, fallback_model: &str) -> Result<Completion> {
    let payload: ChatResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let content = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no completion choices returned from OpenAI"))?
        .message
        .content
        .unwrap_or_default()
        .trim()
        .to_string();
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(Completion {
        content,
        model,
        usage,
    })
}

fn extract_image_payload(text: &str) -> Result<ImagePayload> {
    let payload: ImageResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI image response")?;
    let item = payload
        .data
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no image returned from OpenAI"))?;
    if let Some(b64) = item.b64_json.filter(|value| !value.is_empty()) {
        return Ok(ImagePayload::Base64(b64));
    }
    if let Some(url) = item.url.filter(|value| value.starts_with("http")) {
        return Ok(ImagePayload::Url(url));
    }
    Err(anyhow!("image response carries neither b64_json nor url"))
}

async fn resolve_image_payload(client: &reqwest::Client, payload: ImagePayload) -> Result<Vec<u8>> {
    match payload {
        ImagePayload::Base64(encoded) => BASE64
            .decode(encoded.trim())
            .with_context(|| "failed to decode base64 image"),
        ImagePayload::Url(url) => {
            info!("downloading image from URL");
            let response = client
                .get(&url)
                .send()
                .await
                .with_context(|| "failed to download image")?;
            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("failed to download image: {}", status));
            }
            Ok(response.bytes().await?.to_vec())
        }
    }
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(kind) = kind.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}
