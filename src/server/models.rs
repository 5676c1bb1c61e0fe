use serde::{Deserialize, Serialize};

use crate::design::PreparedPrompt;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct GenerateRequest {
    pub(crate) prompt: Option<String>,
    pub(crate) skip_enhancement: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateResponse {
    pub(crate) original_prompt: String,
    pub(crate) enhanced_prompt: String,
    pub(crate) image_path: Option<String>,
    pub(crate) svg_code: String,
    pub(crate) svg_path: String,
    pub(crate) stages: Option<PreparedPrompt>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ImageToSvgRequest {
    pub(crate) image_base64: Option<String>,
    pub(crate) prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageToSvgResponse {
    pub(crate) svg_code: String,
    pub(crate) svg_path: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) guidance: Option<String>,
}
