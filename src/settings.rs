use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;
use crate::providers::{get_env, OpenAI, ServiceConfig, DEFAULT_BASE_URL};
use crate::vectorize::TraceOptions;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    Vision,
    Ocr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EraserKind {
    Recolor,
    Inpaint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompositorKind {
    Structural,
    Model,
}

/// A model call site; each has its own model id and may override the
/// shared timeout and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceStage {
    Planner,
    Vision,
    Image,
    Editor,
    Composer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceOverride {
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub planner_model: String,
    pub vision_model: String,
    pub image_model: String,
    pub editor_model: String,
    pub composer_model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub service_overrides: BTreeMap<ServiceStage, ServiceOverride>,
    pub extractor: ExtractorKind,
    pub eraser: EraserKind,
    pub compositor: CompositorKind,
    pub ocr_languages: String,
    pub ocr_psm: u32,
    pub ocr_min_confidence: f32,
    pub erase_padding: u32,
    pub debug_overlays: bool,
    pub image_size: String,
    pub image_quality: Option<String>,
    pub trace: TraceOptions,
    pub assets_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            planner_model: "gpt-4.1-mini".to_string(),
            vision_model: "gpt-4.1-mini".to_string(),
            image_model: "gpt-image-1".to_string(),
            editor_model: "gpt-image-1".to_string(),
            composer_model: "gpt-4.1-nano".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 0,
            max_retries: 5,
            service_overrides: BTreeMap::new(),
            extractor: ExtractorKind::Vision,
            eraser: EraserKind::Recolor,
            compositor: CompositorKind::Structural,
            ocr_languages: "eng".to_string(),
            ocr_psm: 11,
            ocr_min_confidence: 60.0,
            erase_padding: 2,
            debug_overlays: false,
            image_size: "1024x1024".to_string(),
            image_quality: Some("low".to_string()),
            trace: TraceOptions::default(),
            assets_dir: paths::assets_dir(),
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    models: Option<ModelSettings>,
    service: Option<ServiceSettings>,
    pipeline: Option<PipelineSettings>,
    vectorize: Option<VectorizeSettings>,
    assets: Option<AssetSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelSettings {
    planner: Option<String>,
    vision: Option<String>,
    image: Option<String>,
    editor: Option<String>,
    composer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSettings {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<usize>,
    planner: Option<ServiceOverride>,
    vision: Option<ServiceOverride>,
    image: Option<ServiceOverride>,
    editor: Option<ServiceOverride>,
    composer: Option<ServiceOverride>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    extractor: Option<ExtractorKind>,
    eraser: Option<EraserKind>,
    compositor: Option<CompositorKind>,
    ocr_languages: Option<String>,
    ocr_psm: Option<u32>,
    ocr_min_confidence: Option<f32>,
    erase_padding: Option<u32>,
    debug_overlays: Option<bool>,
    image_size: Option<String>,
    image_quality: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VectorizeSettings {
    color_mode: Option<String>,
    hierarchical: Option<String>,
    mode: Option<String>,
    filter_speckle: Option<usize>,
    color_precision: Option<i32>,
    layer_difference: Option<i32>,
    corner_threshold: Option<i32>,
    length_threshold: Option<f64>,
    max_iterations: Option<usize>,
    splice_threshold: Option<i32>,
    path_precision: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetSettings {
    dir: Option<String>,
    scratch_dir: Option<String>,
}

/// Embedded defaults, then `./settings.toml`, `./settings.local.toml`, the
/// per-user files and finally `extra_path`; later files win per field.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults);
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    if let Some(base_url) = get_env("OPENAI_BASE_URL") {
        settings.base_url = base_url;
    }
    Ok(settings)
}

impl Settings {
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    pub fn model_for(&self, stage: ServiceStage) -> &str {
        match stage {
            ServiceStage::Planner => &self.planner_model,
            ServiceStage::Vision => &self.vision_model,
            ServiceStage::Image => &self.image_model,
            ServiceStage::Editor => &self.editor_model,
            ServiceStage::Composer => &self.composer_model,
        }
    }

    /// Connection settings for one model call site: the `[service]` values,
    /// overridden by that stage's `[service.<stage>]` table.
    pub fn service_config(&self, stage: ServiceStage, key: &str) -> ServiceConfig {
        let stage_override = self
            .service_overrides
            .get(&stage)
            .copied()
            .unwrap_or_default();
        let timeout_secs = stage_override.timeout_secs.unwrap_or(self.timeout_secs);
        let max_retries = stage_override
            .max_retries
            .filter(|retries| *retries > 0)
            .unwrap_or(self.max_retries);
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        ServiceConfig::new(key)
            .with_base_url(&self.base_url)
            .with_timeout(timeout)
            .with_max_retries(max_retries)
    }

    /// Client for `stage` with its model and connection settings applied.
    pub fn client_for(&self, stage: ServiceStage, key: &str) -> OpenAI {
        OpenAI::new(self.service_config(stage, key)).with_model(self.model_for(stage))
    }

    /// True when any configured stage talks to the model service.
    pub fn uses_remote_models(&self) -> bool {
        self.extractor == ExtractorKind::Vision
            || self.eraser == EraserKind::Inpaint
            || self.compositor == CompositorKind::Model
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(models) = incoming.models {
            merge_string(&mut self.planner_model, models.planner);
            merge_string(&mut self.vision_model, models.vision);
            merge_string(&mut self.image_model, models.image);
            merge_string(&mut self.editor_model, models.editor);
            merge_string(&mut self.composer_model, models.composer);
        }
        if let Some(service) = incoming.service {
            merge_string(&mut self.base_url, service.base_url);
            if let Some(timeout) = service.timeout_secs {
                self.timeout_secs = timeout;
            }
            if let Some(retries) = service.max_retries
                && retries > 0
            {
                self.max_retries = retries;
            }
            let stages = [
                (ServiceStage::Planner, service.planner),
                (ServiceStage::Vision, service.vision),
                (ServiceStage::Image, service.image),
                (ServiceStage::Editor, service.editor),
                (ServiceStage::Composer, service.composer),
            ];
            for (stage, incoming) in stages {
                let Some(incoming) = incoming else {
                    continue;
                };
                let slot = self.service_overrides.entry(stage).or_default();
                merge_value(&mut slot.timeout_secs, incoming.timeout_secs.map(Some));
                merge_value(&mut slot.max_retries, incoming.max_retries.map(Some));
            }
        }
        if let Some(pipeline) = incoming.pipeline {
            if let Some(kind) = pipeline.extractor {
                self.extractor = kind;
            }
            if let Some(kind) = pipeline.eraser {
                self.eraser = kind;
            }
            if let Some(kind) = pipeline.compositor {
                self.compositor = kind;
            }
            merge_string(&mut self.ocr_languages, pipeline.ocr_languages);
            if let Some(psm) = pipeline.ocr_psm {
                self.ocr_psm = psm;
            }
            if let Some(conf) = pipeline.ocr_min_confidence
                && (0.0..=100.0).contains(&conf)
            {
                self.ocr_min_confidence = conf;
            }
            if let Some(padding) = pipeline.erase_padding {
                self.erase_padding = padding;
            }
            if let Some(debug) = pipeline.debug_overlays {
                self.debug_overlays = debug;
            }
            merge_string(&mut self.image_size, pipeline.image_size);
            if let Some(quality) = pipeline.image_quality {
                let quality = quality.trim().to_string();
                self.image_quality = (!quality.is_empty()).then_some(quality);
            }
        }
        if let Some(vectorize) = incoming.vectorize {
            let trace = &mut self.trace;
            merge_string(&mut trace.color_mode, vectorize.color_mode);
            merge_string(&mut trace.hierarchical, vectorize.hierarchical);
            merge_string(&mut trace.mode, vectorize.mode);
            merge_value(&mut trace.filter_speckle, vectorize.filter_speckle);
            merge_value(&mut trace.color_precision, vectorize.color_precision);
            merge_value(&mut trace.layer_difference, vectorize.layer_difference);
            merge_value(&mut trace.corner_threshold, vectorize.corner_threshold);
            merge_value(&mut trace.length_threshold, vectorize.length_threshold);
            merge_value(&mut trace.max_iterations, vectorize.max_iterations);
            merge_value(&mut trace.splice_threshold, vectorize.splice_threshold);
            if let Some(precision) = vectorize.path_precision {
                trace.path_precision = Some(precision);
            }
        }
        if let Some(assets) = incoming.assets {
            if let Some(dir) = assets.dir.as_deref().and_then(paths::resolve_dir) {
                self.assets_dir = dir;
            }
            if let Some(dir) = assets.scratch_dir.as_deref().and_then(paths::resolve_dir) {
                self.scratch_dir = Some(dir);
            }
        }
    }
}

fn merge_string(slot: &mut String, value: Option<String>) {
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *slot = value.trim().to_string();
    }
}

fn merge_value<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let mut settings = Settings::default();
        settings.merge_str(DEFAULT_SETTINGS_TOML).unwrap();
        assert_eq!(settings.extractor, ExtractorKind::Vision);
        assert_eq!(settings.eraser, EraserKind::Recolor);
        assert_eq!(settings.trace, TraceOptions::default());
        assert_eq!(settings.ocr_min_confidence, 60.0);
    }

    #[test]
    fn later_layers_override_fields() {
        let mut settings = Settings::default();
        settings
            .merge_str(
                r#"
[pipeline]
extractor = "ocr"
compositor = "model"
image_quality = ""

[vectorize]
corner_threshold = 75

[service]
max_retries = 0
timeout_secs = 30
"#,
            )
            .unwrap();
        assert_eq!(settings.extractor, ExtractorKind::Ocr);
        assert_eq!(settings.compositor, CompositorKind::Model);
        assert_eq!(settings.eraser, EraserKind::Recolor);
        assert_eq!(settings.image_quality, None);
        assert_eq!(settings.trace.corner_threshold, 75);
        assert_eq!(settings.trace.splice_threshold, 45);
        assert_eq!(settings.max_retries, 5);
        let config = settings.service_config(ServiceStage::Planner, "k");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn stage_tables_override_shared_service_policy() {
        let mut settings = Settings::default();
        settings
            .merge_str(
                r#"
[service]
timeout_secs = 30
max_retries = 4

[service.vision]
timeout_secs = 90

[service.image]
max_retries = 2
"#,
            )
            .unwrap();
        settings
            .merge_str("[service.vision]\nmax_retries = 7\n")
            .unwrap();

        let vision = settings.service_config(ServiceStage::Vision, "k");
        assert_eq!(vision.timeout, Some(Duration::from_secs(90)));
        assert_eq!(vision.max_retries, 7);

        let image = settings.service_config(ServiceStage::Image, "k");
        assert_eq!(image.timeout, Some(Duration::from_secs(30)));
        assert_eq!(image.max_retries, 2);

        let composer = settings.service_config(ServiceStage::Composer, "k");
        assert_eq!(composer.timeout, Some(Duration::from_secs(30)));
        assert_eq!(composer.max_retries, 4);

        assert_eq!(settings.client_for(ServiceStage::Editor, "k").model(), "gpt-image-1");
    }

    #[test]
    fn local_strategies_need_no_service() {
        let mut settings = Settings::default();
        assert!(settings.uses_remote_models());
        settings.extractor = ExtractorKind::Ocr;
        assert!(!settings.uses_remote_models());
        settings.compositor = CompositorKind::Model;
        assert!(settings.uses_remote_models());
    }

    #[test]
    fn unknown_strategy_is_an_error() {
        let mut settings = Settings::default();
        assert!(settings.merge_str("[pipeline]\neraser = \"blur\"").is_err());
    }
}
