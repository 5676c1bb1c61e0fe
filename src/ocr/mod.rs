mod tesseract;
mod tsv;

use anyhow::{Context, Result};
use tracing::info;

use crate::raster::RasterImage;
use crate::scratch::Scratch;

pub use tesseract::list_tesseract_languages;
pub use tsv::parse_tsv_words;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}

/// One recognized word with its box and engine confidence (0..100).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BBoxPx,
    pub conf: f32,
}

#[derive(Debug, Clone)]
pub struct OcrOptions {
    pub languages: String,
    pub psm: u32,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            languages: "eng".to_string(),
            psm: 11,
        }
    }
}

/// Runs tesseract over `image` and returns every word-level token.
pub fn recognize_words(
    image: &RasterImage,
    options: &OcrOptions,
    scratch: &Scratch,
) -> Result<Vec<OcrWord>> {
    let languages = tesseract::normalize_ocr_languages(&options.languages)?;
    let path = scratch.path("ocr_source.png");
    image
        .write_png(&path)
        .with_context(|| "failed to stage image for OCR")?;
    let tsv = tesseract::run_tesseract_tsv(&path, &languages, options.psm)?;
    let words = parse_tsv_words(&tsv);
    info!(
        "ocr: {} word tokens ({} languages, psm {})",
        words.len(),
        languages,
        options.psm
    );
    Ok(words)
}
