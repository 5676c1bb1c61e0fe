use std::time::Instant;
use tracing::{info, warn};

use super::RegionExtractor;
use crate::pipeline::StageFuture;
use crate::providers::{ChatOptions, OpenAI};
use crate::raster::RasterImage;
use crate::region::{parse_region_response, RawRegion};

const SYSTEM_PROMPT: &str = r##"You analyze images and list every text element with exact measurements.
For each element report: text (verbatim), x and y (top-left corner in pixels), width and height
(pixels), color (hex such as #000000), font_size (pixels), font_weight, font_style, alignment
(left, center or right), font_family (best guess) and text_type (title, subtitle, heading, body,
name, job_title, quote, button or label). Keep separate elements separate.
Reply with a JSON object of the form {"regions": [{"text": "...", "x": 0, "y": 0, "width": 0,
"height": 0, "color": "#000000", "font_size": 16, "font_weight": "normal", "font_style": "normal",
"alignment": "left", "font_family": "Arial", "text_type": "body"}]}."##;

const USER_PROMPT: &str =
    "Identify all text elements in this image with their exact properties. Measurements must be precise.";

/// Region extraction through a vision-capable chat model.
#[derive(Debug, Clone)]
pub struct VisionExtractor {
    client: OpenAI,
}

impl VisionExtractor {
    pub fn new(client: OpenAI) -> Self {
        Self { client }
    }

    async fn run(&self, image: &RasterImage, prompt_context: &str) -> Vec<RawRegion> {
        let png = match image.to_png() {
            Ok(png) => png,
            Err(err) => {
                warn!("extract: could not encode image for vision call: {}", err);
                return Vec::new();
            }
        };
        let mut user = USER_PROMPT.to_string();
        let context = prompt_context.trim();
        if !context.is_empty() {
            user.push_str("\n\nThe image was generated for this request, which may hint at the expected text:\n");
            user.push_str(context);
        }

        info!(
            "extract: analyzing {}x{} image ({} bytes) for text",
            image.width(),
            image.height(),
            png.len()
        );
        let started = Instant::now();
        let reply = self
            .client
            .clone()
            .append_system_input(SYSTEM_PROMPT)
            .append_user_image(user, "image/png", png)
            .complete(
                "extract",
                ChatOptions {
                    temperature: Some(0.7),
                    max_tokens: Some(4000),
                    json_object: true,
                },
            )
            .await;
        match reply {
            Ok(completion) => {
                let regions = parse_region_response(&completion.content);
                info!(
                    "extract: {} raw regions in {:.2}s",
                    regions.len(),
                    started.elapsed().as_secs_f32()
                );
                regions
            }
            Err(err) => {
                warn!(
                    "extract: vision call failed after {:.2}s; continuing without text: {}",
                    started.elapsed().as_secs_f32(),
                    err
                );
                Vec::new()
            }
        }
    }
}

impl RegionExtractor for VisionExtractor {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn extract<'a>(
        &'a self,
        image: &'a RasterImage,
        prompt_context: &'a str,
    ) -> StageFuture<'a, Vec<RawRegion>> {
        Box::pin(self.run(image, prompt_context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::normalize_regions;

    #[test]
    fn system_prompt_carries_the_whole_reply_example() {
        assert!(SYSTEM_PROMPT.contains(r##""color": "#000000""##));
        let example = SYSTEM_PROMPT
            .split_once("of the form ")
            .map(|(_, tail)| tail.trim_end_matches('.'))
            .unwrap();
        let regions = normalize_regions(&parse_region_response(example));
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].color, "#000000");
        assert_eq!(regions[0].font_family, "Arial");
    }
}
