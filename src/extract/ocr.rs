use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use super::RegionExtractor;
use crate::ocr::{recognize_words, OcrOptions, OcrWord};
use crate::pipeline::StageFuture;
use crate::raster::RasterImage;
use crate::region::RawRegion;
use crate::scratch::Scratch;

pub const DEFAULT_MIN_CONFIDENCE: f32 = 60.0;
const MIN_TEXT_CHARS: usize = 2;

/// Deterministic region extraction with the tesseract engine.
#[derive(Debug, Clone)]
pub struct OcrExtractor {
    options: OcrOptions,
    min_confidence: f32,
    scratch_root: Option<PathBuf>,
}

impl OcrExtractor {
    pub fn new(options: OcrOptions) -> Self {
        Self {
            options,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            scratch_root: None,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    fn run_blocking(&self, image: &RasterImage) -> Vec<RawRegion> {
        let words = Scratch::new(self.scratch_root.as_deref())
            .and_then(|scratch| recognize_words(image, &self.options, &scratch));
        match words {
            Ok(words) => {
                let regions = words_to_regions(&words, image, self.min_confidence);
                info!(
                    "extract: ocr kept {} of {} tokens",
                    regions.len(),
                    words.len()
                );
                regions
            }
            Err(err) => {
                warn!("extract: ocr failed; continuing without text: {}", err);
                Vec::new()
            }
        }
    }
}

/// Drops low-confidence and single-character tokens and samples each
/// token's center pixel for its fill.
pub fn words_to_regions(words: &[OcrWord], image: &RasterImage, min_confidence: f32) -> Vec<RawRegion> {
    words
        .iter()
        .filter(|word| word.conf >= min_confidence)
        .filter(|word| word.text.trim().chars().count() >= MIN_TEXT_CHARS)
        .map(|word| {
            let (cx, cy) = word.bbox.center();
            json!({
                "text": word.text.trim(),
                "x": word.bbox.x,
                "y": word.bbox.y,
                "width": word.bbox.w,
                "height": word.bbox.h,
                "font_size": word.bbox.h,
                "color": image.pixel_hex(cx, cy),
            })
        })
        .collect()
}

impl RegionExtractor for OcrExtractor {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn extract<'a>(
        &'a self,
        image: &'a RasterImage,
        _prompt_context: &'a str,
    ) -> StageFuture<'a, Vec<RawRegion>> {
        let this = self.clone();
        let image = image.clone();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || this.run_blocking(&image)).await {
                Ok(regions) => regions,
                Err(err) => {
                    warn!("extract: ocr task failed: {}", err);
                    Vec::new()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::BBoxPx;
    use image::{DynamicImage, Rgb, RgbImage};

    fn word(text: &str, conf: f32, x: u32) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            bbox: BBoxPx { x, y: 10, w: 20, h: 10 },
            conf,
        }
    }

    #[test]
    fn filters_noise_and_samples_center_color() {
        let mut img = RgbImage::from_pixel(100, 40, Rgb([255, 255, 255]));
        img.put_pixel(10, 15, Rgb([200, 0, 0]));
        let image = RasterImage::from_dynamic(DynamicImage::ImageRgb8(img));
        let words = vec![
            word("OPEN", 95.0, 0),
            word("ok", 60.0, 40),
            word("blur", 59.9, 60),
            word("I", 99.0, 80),
        ];
        let regions = words_to_regions(&words, &image, DEFAULT_MIN_CONFIDENCE);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0]["text"], "OPEN");
        assert_eq!(regions[0]["color"], "#c80000");
        assert_eq!(regions[0]["y"], 10);
        assert_eq!(regions[0]["font_size"], 10);
        assert_eq!(regions[1]["color"], "#ffffff");
    }
}
