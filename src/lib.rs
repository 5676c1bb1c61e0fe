use anyhow::{anyhow, Context, Result};
use image::ImageFormat;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod assets;
pub mod design;
pub mod erase;
pub mod extract;
pub mod logging;
pub mod ocr;
mod paths;
pub mod pipeline;
pub mod providers;
pub mod raster;
pub mod region;
pub mod render;
pub mod scratch;
pub mod server;
pub mod settings;
pub mod svg;
pub mod vectorize;

pub use design::{DesignStages, PreparedPrompt, Suitability};
pub use pipeline::{PipelineOutput, SvgPipeline};
pub use providers::{OpenAI, ServiceConfig};
pub use raster::RasterImage;
pub use region::TextRegion;
pub use settings::{CompositorKind, EraserKind, ExtractorKind, ServiceStage, Settings};

use assets::AssetStore;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub skip_enhancement: bool,
    pub extractor: Option<ExtractorKind>,
    pub eraser: Option<EraserKind>,
    pub compositor: Option<CompositorKind>,
    /// Vectorize this raster instead of generating one from the prompt.
    pub image: Option<PathBuf>,
}

/// Everything one run produced. File names are relative to the asset store.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub original_prompt: String,
    pub prepared: Option<PreparedPrompt>,
    pub image_file: Option<String>,
    pub svg_code: String,
    pub svg_file: String,
    pub regions: Vec<TextRegion>,
}

/// The request was judged a poor fit for vector output.
#[derive(Debug, Clone)]
pub struct UnsuitablePrompt {
    pub guidance: String,
}

impl fmt::Display for UnsuitablePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request is not suitable for SVG output: {}", self.guidance)
    }
}

impl std::error::Error for UnsuitablePrompt {}

pub async fn run(config: Config, input: Option<String>) -> Result<GenerationOutput> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config);

    let prompt = input.unwrap_or_default();
    let prompt = prompt.trim();

    if let Some(path) = config.image.as_deref() {
        let key = match providers::resolve_key(config.key.as_deref()) {
            Ok(key) => key,
            Err(_) if !settings.uses_remote_models() => String::new(),
            Err(err) => return Err(err),
        };
        let image = RasterImage::open(path)?;
        return convert_image(&settings, &key, &image, prompt).await;
    }

    if prompt.is_empty() {
        return Err(anyhow!("prompt is empty"));
    }
    let key = providers::resolve_key(config.key.as_deref())?;
    generate_from_prompt(&settings, &key, prompt, config.skip_enhancement).await
}

/// Command-line strategy choices win over every settings layer.
pub fn apply_overrides(settings: &mut Settings, config: &Config) {
    if let Some(kind) = config.extractor {
        settings.extractor = kind;
    }
    if let Some(kind) = config.eraser {
        settings.eraser = kind;
    }
    if let Some(kind) = config.compositor {
        settings.compositor = kind;
    }
}

/// Suitability check, prompt preparation, image generation, then the
/// image-to-SVG pipeline. Intermediate and final files land in the asset store.
pub async fn generate_from_prompt(
    settings: &Settings,
    key: &str,
    prompt: &str,
    skip_enhancement: bool,
) -> Result<GenerationOutput> {
    let planner = settings.client_for(ServiceStage::Planner, key);
    let stages = DesignStages::new(planner);

    let verdict = stages.check_vector_suitability(prompt).await;
    if !verdict.suitable {
        return Err(UnsuitablePrompt {
            guidance: verdict.guidance.unwrap_or_default(),
        }
        .into());
    }

    let prepared = stages.prepare_prompt(prompt, skip_enhancement).await?;
    let generator = settings.client_for(ServiceStage::Image, key);
    let bytes = generator
        .generate_image(
            "image_generation",
            providers::ImageRequest {
                prompt: prepared.generation_prompt(),
                size: &settings.image_size,
                quality: settings.image_quality.as_deref(),
            },
        )
        .await
        .with_context(|| "image generation failed")?;

    let store = AssetStore::new(settings.assets_dir.clone());
    let image = RasterImage::from_bytes(&bytes)?;
    let image_file = store.save_raster(&image, "gpt_image", ImageFormat::Png)?;

    let mut output = convert_with_store(settings, key, &image, prompt, &store).await?;
    output.prepared = Some(prepared);
    output.image_file = Some(image_file);
    Ok(output)
}

/// Runs the image-to-SVG pipeline on an existing raster and stores the SVG.
pub async fn convert_image(
    settings: &Settings,
    key: &str,
    image: &RasterImage,
    prompt_context: &str,
) -> Result<GenerationOutput> {
    let store = AssetStore::new(settings.assets_dir.clone());
    convert_with_store(settings, key, image, prompt_context, &store).await
}

async fn convert_with_store(
    settings: &Settings,
    key: &str,
    image: &RasterImage,
    prompt_context: &str,
    store: &AssetStore,
) -> Result<GenerationOutput> {
    let pipeline = SvgPipeline::from_settings(settings, key);
    let output = pipeline.run(image, prompt_context).await?;
    let svg_file = store.save_svg(&output.svg, "svg")?;
    info!("stored {} in {}", svg_file, store.dir().display());
    Ok(GenerationOutput {
        original_prompt: prompt_context.to_string(),
        prepared: None,
        image_file: None,
        svg_code: output.svg,
        svg_file,
        regions: output.regions,
    })
}
