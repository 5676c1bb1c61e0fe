use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use visioncortex::PathSimplifyMode;
use vtracer::{convert_image_to_svg, ColorMode, Config, Hierarchical};

use crate::raster::RasterImage;
use crate::scratch::Scratch;
use crate::svg::ensure_view_box;

/// Bitmap tracing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    pub color_mode: String,
    pub hierarchical: String,
    pub mode: String,
    pub filter_speckle: usize,
    pub color_precision: i32,
    pub layer_difference: i32,
    pub corner_threshold: i32,
    pub length_threshold: f64,
    pub max_iterations: usize,
    pub splice_threshold: i32,
    pub path_precision: Option<u32>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            color_mode: "color".to_string(),
            hierarchical: "stacked".to_string(),
            mode: "spline".to_string(),
            filter_speckle: 4,
            color_precision: 6,
            layer_difference: 16,
            corner_threshold: 60,
            length_threshold: 4.0,
            max_iterations: 10,
            splice_threshold: 45,
            path_precision: Some(8),
        }
    }
}

impl TraceOptions {
    pub fn to_config(&self) -> Result<Config> {
        let color_mode = match self.color_mode.trim().to_lowercase().as_str() {
            "color" | "colour" => ColorMode::Color,
            "binary" | "bw" => ColorMode::Binary,
            other => return Err(anyhow!("unknown color_mode '{}'", other)),
        };
        let hierarchical = match self.hierarchical.trim().to_lowercase().as_str() {
            "stacked" => Hierarchical::Stacked,
            "cutout" => Hierarchical::Cutout,
            other => return Err(anyhow!("unknown hierarchical mode '{}'", other)),
        };
        let mode = match self.mode.trim().to_lowercase().as_str() {
            "spline" => PathSimplifyMode::Spline,
            "polygon" => PathSimplifyMode::Polygon,
            "none" | "pixel" => PathSimplifyMode::None,
            other => return Err(anyhow!("unknown curve mode '{}'", other)),
        };
        Ok(Config {
            color_mode,
            hierarchical,
            mode,
            filter_speckle: self.filter_speckle,
            color_precision: self.color_precision,
            layer_difference: self.layer_difference,
            corner_threshold: self.corner_threshold,
            length_threshold: self.length_threshold,
            max_iterations: self.max_iterations,
            splice_threshold: self.splice_threshold,
            path_precision: self.path_precision,
        })
    }
}

/// Traces `image` into an SVG document carrying a `viewBox`. Any tracer
/// failure is returned as an error; there is no fallback.
pub fn vectorize(image: &RasterImage, options: &TraceOptions, scratch: &Scratch) -> Result<String> {
    let config = options.to_config()?;
    let input = scratch.path("trace_input.png");
    let output = scratch.path("trace_output.svg");
    image.write_png(&input)?;

    let started = Instant::now();
    convert_image_to_svg(&input, &output, config)
        .map_err(|err| anyhow!("vectorization failed: {}", err))?;
    let traced = std::fs::read_to_string(&output)
        .with_context(|| format!("failed to read traced SVG {}", output.display()))?;
    let svg = ensure_view_box(&traced, image.width(), image.height());
    info!(
        "vectorize: traced {}x{} image into {} bytes in {:.2}s ({} paths)",
        image.width(),
        image.height(),
        svg.len(),
        started.elapsed().as_secs_f32(),
        svg.matches("<path").count()
    );
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svg::parse_svg_root;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn rejects_unknown_modes() {
        let options = TraceOptions {
            mode: "bezier".to_string(),
            ..TraceOptions::default()
        };
        assert!(options.to_config().is_err());
        assert!(TraceOptions::default().to_config().is_ok());
    }

    #[test]
    fn traced_output_has_view_box() {
        let mut img = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        for y in 5..15 {
            for x in 5..20 {
                img.put_pixel(x, y, Rgb([200, 30, 30]));
            }
        }
        let image = RasterImage::from_dynamic(DynamicImage::ImageRgb8(img));
        let scratch = Scratch::new(None).unwrap();
        let svg = vectorize(&image, &TraceOptions::default(), &scratch).unwrap();
        let root = parse_svg_root(&svg).unwrap();
        assert_eq!(root.view_box.as_deref(), Some("0 0 40 20"));
        assert!(svg.contains("<path"));
    }
}
