mod ocr;
mod vision;

use crate::pipeline::StageFuture;
use crate::raster::RasterImage;
use crate::region::RawRegion;

pub use ocr::{words_to_regions, OcrExtractor};
pub use vision::VisionExtractor;

/// Finds text in an image. Implementations never fail: any error degrades
/// to an empty list, and nothing returned is trusted before normalization.
pub trait RegionExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract<'a>(
        &'a self,
        image: &'a RasterImage,
        prompt_context: &'a str,
    ) -> StageFuture<'a, Vec<RawRegion>>;
}

#[derive(Debug, Clone)]
pub enum Extractor {
    Vision(VisionExtractor),
    Ocr(OcrExtractor),
}

impl RegionExtractor for Extractor {
    fn name(&self) -> &'static str {
        match self {
            Extractor::Vision(inner) => inner.name(),
            Extractor::Ocr(inner) => inner.name(),
        }
    }

    fn extract<'a>(
        &'a self,
        image: &'a RasterImage,
        prompt_context: &'a str,
    ) -> StageFuture<'a, Vec<RawRegion>> {
        match self {
            Extractor::Vision(inner) => inner.extract(image, prompt_context),
            Extractor::Ocr(inner) => inner.extract(image, prompt_context),
        }
    }
}
