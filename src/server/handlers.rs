use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{
    ErrorResponse, GenerateRequest, GenerateResponse, ImageToSvgRequest, ImageToSvgResponse,
};
use super::state::ServerState;
use crate::raster::RasterImage;
use crate::settings;
use crate::UnsuitablePrompt;

const STATIC_PREFIX: &str = "/static/images";

type Reply<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub async fn run_server(settings: settings::Settings, key: String, addr: String) -> Result<()> {
    let app = router(settings, key);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| "failed to bind server address")?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(settings: settings::Settings, key: String) -> Router {
    let state = Arc::new(ServerState { settings, key });
    Router::new()
        .route("/health", get(health))
        .route("/api/generate-svg", post(generate_svg))
        .route("/api/image-to-svg", post(image_to_svg))
        .route("/static/images/:file", get(static_image))
        .with_state(state)
}

#[derive(Debug)]
pub(crate) struct ServerError {
    status: StatusCode,
    message: String,
    guidance: Option<String>,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            guidance: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            guidance: None,
        }
    }

    fn into_reply(self) -> (StatusCode, Json<ErrorResponse>) {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                guidance: self.guidance,
            }),
        )
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(unsuitable) = err.downcast_ref::<UnsuitablePrompt>() {
            return Self {
                status: StatusCode::BAD_REQUEST,
                message: "request is not suitable for SVG output".to_string(),
                guidance: Some(unsuitable.guidance.clone()),
            };
        }
        ServerError::internal(format!("{:#}", err))
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn generate_svg(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<GenerateRequest>,
) -> Reply<GenerateResponse> {
    let prompt = payload.prompt.unwrap_or_default().trim().to_string();
    if prompt.is_empty() {
        return Err(ServerError::bad_request("prompt is required").into_reply());
    }
    let skip_enhancement = payload.skip_enhancement.unwrap_or(false);
    info!("generate-svg: {} chars, skip_enhancement={}", prompt.len(), skip_enhancement);

    let state = state.clone();
    let handle = tokio::runtime::Handle::current();
    let task_prompt = prompt.clone();
    let result = tokio::task::spawn_blocking(move || {
        handle.block_on(crate::generate_from_prompt(
            &state.settings,
            &state.key,
            &task_prompt,
            skip_enhancement,
        ))
    })
    .await
    .map_err(task_failed)?;

    let output = result.map_err(|err| ServerError::from(err).into_reply())?;
    let enhanced_prompt = output
        .prepared
        .as_ref()
        .map(|prepared| prepared.enhanced.clone())
        .unwrap_or_else(|| prompt.clone());
    Ok(Json(GenerateResponse {
        original_prompt: prompt,
        enhanced_prompt,
        image_path: output.image_file.as_deref().map(static_path),
        svg_code: output.svg_code,
        svg_path: static_path(&output.svg_file),
        stages: output.prepared,
    }))
}

async fn image_to_svg(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ImageToSvgRequest>,
) -> Reply<ImageToSvgResponse> {
    let encoded = payload.image_base64.unwrap_or_default();
    let bytes = decode_image_payload(&encoded).map_err(ServerError::into_reply)?;
    let image = RasterImage::from_bytes(&bytes)
        .map_err(|err| ServerError::bad_request(err.to_string()).into_reply())?;
    let prompt = payload.prompt.unwrap_or_default();
    info!(
        "image-to-svg: {}x{} image ({} bytes)",
        image.width(),
        image.height(),
        bytes.len()
    );

    let state = state.clone();
    let handle = tokio::runtime::Handle::current();
    let result = tokio::task::spawn_blocking(move || {
        handle.block_on(crate::convert_image(
            &state.settings,
            &state.key,
            &image,
            prompt.trim(),
        ))
    })
    .await
    .map_err(task_failed)?;

    let output = result.map_err(|err| ServerError::from(err).into_reply())?;
    Ok(Json(ImageToSvgResponse {
        svg_code: output.svg_code,
        svg_path: static_path(&output.svg_file),
    }))
}

async fn static_image(
    State(state): State<Arc<ServerState>>,
    AxumPath(file): AxumPath<String>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if !is_safe_file_name(&file) {
        return Err(ServerError::bad_request("invalid file name").into_reply());
    }
    let path = state.store().path_of(&file);
    let bytes = tokio::fs::read(&path).await.map_err(|err| {
        warn!("static file {} unavailable: {}", path.display(), err);
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "file not found".to_string(),
                guidance: None,
            }),
        )
    })?;
    let mime = content_type(&file, &bytes);
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

fn task_failed(err: tokio::task::JoinError) -> (StatusCode, Json<ErrorResponse>) {
    ServerError::internal(format!("server task failed: {}", err)).into_reply()
}

fn static_path(file_name: &str) -> String {
    format!("{}/{}", STATIC_PREFIX, file_name)
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

/// Accepts bare base64 or a `data:` URL; the payload must sniff as an image.
fn decode_image_payload(payload: &str) -> Result<Vec<u8>, ServerError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(ServerError::bad_request("image_base64 is required"));
    }
    let data = match trimmed.split_once(";base64,") {
        Some((_, data)) if trimmed.starts_with("data:") => data,
        _ => trimmed,
    };
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|err| ServerError::bad_request(format!("invalid base64 image: {}", err)))?;
    if !infer::is_image(&bytes) {
        return Err(ServerError::bad_request("payload is not a supported image"));
    }
    Ok(bytes)
}

fn content_type(file_name: &str, bytes: &[u8]) -> String {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".svg") {
        return "image/svg+xml".to_string();
    }
    if lower.ends_with(".json") {
        return "application/json".to_string();
    }
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
