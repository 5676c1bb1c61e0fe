use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "LLM_SVG_RUST_DIR";
const APP_DIR: &str = ".llm-svg-rust";

pub(crate) fn settings_dir() -> Option<PathBuf> {
    if let Some(dir) = base_dir_override() {
        return Some(dir);
    }
    home_join(APP_DIR)
}

/// Default asset directory when settings do not name one.
pub(crate) fn assets_dir() -> PathBuf {
    if let Some(dir) = base_dir_override() {
        return dir.join("images");
    }
    home_join(&format!("{}/images", APP_DIR))
        .unwrap_or_else(|| PathBuf::from(APP_DIR).join("images"))
}

/// Expands `~` and normalizes a configured directory.
pub(crate) fn resolve_dir(value: &str) -> Option<PathBuf> {
    normalize_dir(value)
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(suffix))
        }
    })
}

fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    Some(normalize_path(PathBuf::from(expanded)))
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        normalized.push(component.as_os_str());
    }
    normalized
}

fn expand_tilde(value: &str) -> String {
    if (value == "~" || value.starts_with("~/"))
        && let Ok(home) = std::env::var("HOME")
    {
        let home = home.trim();
        if home.is_empty() {
            return value.to_string();
        }
        if value == "~" {
            return home.to_string();
        }
        return format!("{}{}", home, &value[1..]);
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_directories_are_ignored() {
        assert_eq!(resolve_dir("   "), None);
        assert_eq!(resolve_dir("static/images/"), Some(PathBuf::from("static/images")));
    }
}
