use anyhow::{Context, Result};
use image::ImageFormat;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::assets::AssetStore;
use crate::erase::{Eraser, InpaintEraser, RecolorEraser, TextEraser};
use crate::extract::{Extractor, OcrExtractor, RegionExtractor, VisionExtractor};
use crate::ocr::OcrOptions;
use crate::raster::RasterImage;
use crate::region::{normalize_regions, TextRegion};
use crate::render::render_region_overlay;
use crate::scratch::Scratch;
use crate::settings::{CompositorKind, EraserKind, ExtractorKind, ServiceStage, Settings};
use crate::svg::{synthesize_text_layer, Composer, Compositor, ModelCompositor};
use crate::vectorize::{vectorize, TraceOptions};

pub type StageFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one image-to-SVG run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub svg: String,
    pub regions: Vec<TextRegion>,
    pub erase_attempted: bool,
}

/// Image-to-SVG reconstruction: extract and normalize text regions, then
/// erase-and-trace the graphic while re-synthesizing the text, then merge.
#[derive(Debug, Clone)]
pub struct SvgPipeline<X = Extractor, E = Eraser, C = Composer> {
    extractor: X,
    eraser: E,
    compositor: C,
    trace: TraceOptions,
    scratch_root: Option<PathBuf>,
    debug_store: Option<AssetStore>,
}

impl SvgPipeline {
    /// Wires the configured strategies, each with its own model client.
    pub fn from_settings(settings: &Settings, key: &str) -> Self {
        let client = |stage| settings.client_for(stage, key);

        let extractor = match settings.extractor {
            ExtractorKind::Vision => {
                Extractor::Vision(VisionExtractor::new(client(ServiceStage::Vision)))
            }
            ExtractorKind::Ocr => Extractor::Ocr(
                OcrExtractor::new(OcrOptions {
                    languages: settings.ocr_languages.clone(),
                    psm: settings.ocr_psm,
                })
                .with_min_confidence(settings.ocr_min_confidence)
                .with_scratch_root(settings.scratch_dir.clone()),
            ),
        };
        let eraser = match settings.eraser {
            EraserKind::Recolor => Eraser::Recolor(RecolorEraser::new(settings.erase_padding)),
            EraserKind::Inpaint => Eraser::Inpaint(
                InpaintEraser::new(client(ServiceStage::Editor))
                    .with_padding(settings.erase_padding),
            ),
        };
        let compositor = match settings.compositor {
            CompositorKind::Structural => Composer::Structural,
            CompositorKind::Model => {
                Composer::Model(ModelCompositor::new(client(ServiceStage::Composer)))
            }
        };

        let debug_store = settings
            .debug_overlays
            .then(|| AssetStore::new(settings.assets_dir.clone()));
        SvgPipeline::new(extractor, eraser, compositor)
            .with_trace_options(settings.trace.clone())
            .with_scratch_root(settings.scratch_dir.clone())
            .with_debug_store(debug_store)
    }
}

impl<X, E, C> SvgPipeline<X, E, C>
where
    X: RegionExtractor,
    E: TextEraser,
    C: Compositor,
{
    pub fn new(extractor: X, eraser: E, compositor: C) -> Self {
        Self {
            extractor,
            eraser,
            compositor,
            trace: TraceOptions::default(),
            scratch_root: None,
            debug_store: None,
        }
    }

    pub fn with_trace_options(mut self, trace: TraceOptions) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn with_debug_store(mut self, store: Option<AssetStore>) -> Self {
        self.debug_store = store;
        self
    }

    /// Returns the composed SVG. Only a vectorization failure is an error;
    /// extraction, erasure and composition problems degrade.
    pub async fn generate_svg_from_image(
        &self,
        image: &RasterImage,
        prompt_context: &str,
    ) -> Result<String> {
        Ok(self.run(image, prompt_context).await?.svg)
    }

    pub async fn run(&self, image: &RasterImage, prompt_context: &str) -> Result<PipelineOutput> {
        let started = Instant::now();
        info!(
            "converting {}x{} {} image to SVG (extractor {}, eraser {}, compositor {})",
            image.width(),
            image.height(),
            image.mode().as_str(),
            self.extractor.name(),
            self.eraser.name(),
            self.compositor.name()
        );

        let raw = self.extractor.extract(image, prompt_context).await;
        let regions = normalize_regions(&raw);
        info!(
            "extract: {} of {} raw regions usable ({:.2}s)",
            regions.len(),
            raw.len(),
            started.elapsed().as_secs_f32()
        );
        if !regions.is_empty() {
            self.save_debug_overlay(image, &regions);
        }

        let paths_branch = self.trace_graphic(image, &regions);
        let text_branch = async {
            let layer = synthesize_text_layer(&regions);
            info!("synthesize: text layer {} bytes", layer.len());
            Ok::<_, anyhow::Error>(layer)
        };
        let ((paths_svg, erase_attempted), text_layer) =
            tokio::try_join!(paths_branch, text_branch).inspect_err(|err| {
                error!(
                    "SVG generation failed after {:.2}s: {:#}",
                    started.elapsed().as_secs_f32(),
                    err
                );
            })?;

        let svg = self.compositor.compose(&paths_svg, &text_layer).await;
        info!(
            "SVG generated: {} bytes in {:.2}s",
            svg.len(),
            started.elapsed().as_secs_f32()
        );
        Ok(PipelineOutput {
            svg,
            regions,
            erase_attempted,
        })
    }

    /// Erase branch. The scratch directory lives until tracing ends, on
    /// every exit path.
    async fn trace_graphic(
        &self,
        image: &RasterImage,
        regions: &[TextRegion],
    ) -> Result<(String, bool)> {
        let scratch = Scratch::new(self.scratch_root.as_deref())?;
        let (source, erased) = if regions.is_empty() {
            info!("no text regions; vectorizing the original image");
            (image.clone(), false)
        } else {
            let erase_started = Instant::now();
            let erased = self.eraser.erase(image, regions, &scratch).await;
            info!(
                "erase: {} regions handled by {} in {:.2}s",
                regions.len(),
                self.eraser.name(),
                erase_started.elapsed().as_secs_f32()
            );
            (erased, true)
        };

        let trace = self.trace.clone();
        let svg = tokio::task::spawn_blocking(move || vectorize(&source, &trace, &scratch))
            .await
            .with_context(|| "vectorization task panicked")??;
        Ok((svg, erased))
    }

    fn save_debug_overlay(&self, image: &RasterImage, regions: &[TextRegion]) {
        let Some(store) = &self.debug_store else {
            return;
        };
        let overlay = render_region_overlay(image, regions)
            .and_then(|png| store.save_image(&png, "debug_text_regions", ImageFormat::Png));
        match overlay {
            Ok(name) => info!("saved debug image with text regions highlighted: {}", name),
            Err(err) => warn!("could not save debug overlay: {}", err),
        }
        let saved = serde_json::to_value(regions)
            .map_err(anyhow::Error::from)
            .and_then(|value| store.save_json(&value, "debug_text_regions"));
        if let Err(err) = saved {
            warn!("could not save debug regions: {}", err);
        }
    }
}
