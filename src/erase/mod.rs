mod inpaint;
mod mask;
mod recolor;

use crate::pipeline::StageFuture;
use crate::raster::RasterImage;
use crate::region::TextRegion;
use crate::scratch::Scratch;

pub use inpaint::InpaintEraser;
pub use mask::build_edit_mask;
pub use recolor::{pick_fill_color, sample_border_average, RecolorEraser};

pub const DEFAULT_PADDING: u32 = 2;

/// Blanks text regions out of an image. The result is always a fresh image;
/// a failed erasure hands back a copy of the input.
pub trait TextEraser: Send + Sync {
    fn name(&self) -> &'static str;
    fn erase<'a>(
        &'a self,
        image: &'a RasterImage,
        regions: &'a [TextRegion],
        scratch: &'a Scratch,
    ) -> StageFuture<'a, RasterImage>;
}

#[derive(Debug, Clone)]
pub enum Eraser {
    Recolor(RecolorEraser),
    Inpaint(InpaintEraser),
}

impl TextEraser for Eraser {
    fn name(&self) -> &'static str {
        match self {
            Eraser::Recolor(inner) => inner.name(),
            Eraser::Inpaint(inner) => inner.name(),
        }
    }

    fn erase<'a>(
        &'a self,
        image: &'a RasterImage,
        regions: &'a [TextRegion],
        scratch: &'a Scratch,
    ) -> StageFuture<'a, RasterImage> {
        match self {
            Eraser::Recolor(inner) => inner.erase(image, regions, scratch),
            Eraser::Inpaint(inner) => inner.erase(image, regions, scratch),
        }
    }
}
