use anyhow::{Context, Result};
use image::DynamicImage;
use std::time::Instant;
use tracing::{info, warn};

use super::mask::build_edit_mask;
use super::{TextEraser, DEFAULT_PADDING};
use crate::pipeline::StageFuture;
use crate::providers::{ImageRequest, OpenAI};
use crate::raster::RasterImage;
use crate::region::TextRegion;
use crate::scratch::Scratch;

const EDIT_SIZE: &str = "1024x1024";
const EDIT_PROMPT: &str = "Remove all text from this image. Do not fill the text areas with new \
content; leave the space where the text was empty. Do not add any new text or elements.";

/// Generative eraser backed by the image-editing endpoint.
#[derive(Debug, Clone)]
pub struct InpaintEraser {
    client: OpenAI,
    padding: u32,
}

impl InpaintEraser {
    pub fn new(client: OpenAI) -> Self {
        Self {
            client,
            padding: DEFAULT_PADDING,
        }
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    async fn run(&self, image: &RasterImage, regions: &[TextRegion], scratch: &Scratch) -> RasterImage {
        let started = Instant::now();
        match self.try_erase(image, regions, scratch).await {
            Ok(erased) => {
                info!(
                    "erase: text removed with {} in {:.2}s",
                    self.client.model(),
                    started.elapsed().as_secs_f32()
                );
                erased
            }
            Err(err) => {
                warn!(
                    "erase: edit failed after {:.2}s; keeping original image: {:#}",
                    started.elapsed().as_secs_f32(),
                    err
                );
                image.clone()
            }
        }
    }

    async fn try_erase(
        &self,
        image: &RasterImage,
        regions: &[TextRegion],
        scratch: &Scratch,
    ) -> Result<RasterImage> {
        let (width, height) = image.dimensions();
        let mask = RasterImage::from_dynamic(DynamicImage::ImageRgba8(build_edit_mask(
            width,
            height,
            regions,
            self.padding,
        )));

        let source_path = scratch.path("edit_source.png");
        let mask_path = scratch.path("edit_mask.png");
        image.write_png(&source_path)?;
        mask.write_png(&mask_path)?;
        let source_png = std::fs::read(&source_path)
            .with_context(|| format!("failed to read {}", source_path.display()))?;
        let mask_png = std::fs::read(&mask_path)
            .with_context(|| format!("failed to read {}", mask_path.display()))?;
        info!(
            "erase: {} regions masked (source {} bytes, mask {} bytes)",
            regions.len(),
            source_png.len(),
            mask_png.len()
        );

        let edited = self
            .client
            .edit_image(
                "erase",
                &source_png,
                &mask_png,
                ImageRequest {
                    prompt: EDIT_PROMPT,
                    size: EDIT_SIZE,
                    quality: None,
                },
            )
            .await?;
        let edited = RasterImage::from_bytes(&edited).with_context(|| "edited image is not decodable")?;
        edited
            .write_png(&scratch.path("edit_result.png"))
            .with_context(|| "failed to keep edited image")?;

        if edited.dimensions() != (width, height) {
            info!(
                "erase: resizing edited image {}x{} back to {}x{}",
                edited.width(),
                edited.height(),
                width,
                height
            );
            return Ok(edited.resized(width, height));
        }
        Ok(edited)
    }
}

impl TextEraser for InpaintEraser {
    fn name(&self) -> &'static str {
        "inpaint"
    }

    fn erase<'a>(
        &'a self,
        image: &'a RasterImage,
        regions: &'a [TextRegion],
        scratch: &'a Scratch,
    ) -> StageFuture<'a, RasterImage> {
        Box::pin(self.run(image, regions, scratch))
    }
}
