use image::{Rgba, RgbaImage};
use tracing::{debug, info};

use super::{TextEraser, DEFAULT_PADDING};
use crate::pipeline::StageFuture;
use crate::raster::RasterImage;
use crate::region::TextRegion;
use crate::scratch::Scratch;

const SAMPLE_STRIDE: usize = 2;
const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Offline eraser: paints every padded text box with the background color
/// most often seen around the boxes.
#[derive(Debug, Clone)]
pub struct RecolorEraser {
    padding: u32,
}

impl Default for RecolorEraser {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
        }
    }
}

impl RecolorEraser {
    pub fn new(padding: u32) -> Self {
        Self { padding }
    }

    pub fn erase_now(&self, image: &RasterImage, regions: &[TextRegion]) -> RasterImage {
        let mut rgba = image.to_rgba8();
        let averages = regions
            .iter()
            .filter_map(|region| sample_border_average(&rgba, region, self.padding))
            .collect::<Vec<_>>();
        let fill = pick_fill_color(&averages);
        debug!(
            "recolor: {} border samples, fill rgba({}, {}, {}, {})",
            averages.len(),
            fill[0],
            fill[1],
            fill[2],
            fill[3]
        );

        let (width, height) = rgba.dimensions();
        for region in regions {
            let Some((x0, y0, x1, y1)) = region.padded_bounds(self.padding, width, height) else {
                debug!("recolor: '{}' lies outside the image", region.text);
                continue;
            };
            for y in y0..y1 {
                for x in x0..x1 {
                    rgba.put_pixel(x, y, Rgba(fill));
                }
            }
            info!(
                "masked text region '{}' at ({}, {}, {}, {})",
                region.text, x0, y0, x1, y1
            );
        }
        image.with_rgba(rgba)
    }
}

/// Mean color of the pixels just outside `region`'s padded box, sampled
/// every other pixel along each side that lies inside the image.
pub fn sample_border_average(rgba: &RgbaImage, region: &TextRegion, padding: u32) -> Option<[u8; 4]> {
    let (width, height) = rgba.dimensions();
    let (w, h) = (width as f64, height as f64);
    let pad = padding as f64;
    let left = region.x - pad;
    let top = region.y - pad;
    let right = region.x + region.width + pad;
    let bottom = region.y + region.height + pad;

    let mut points = Vec::new();
    let col_start = left.max(0.0) as u32;
    let col_end = right.min(w).max(0.0) as u32;
    for x in (col_start..col_end).step_by(SAMPLE_STRIDE) {
        if region.y > pad {
            points.push((x, top.max(0.0) as u32));
        }
        if bottom < h {
            points.push((x, bottom.min(h - 1.0) as u32));
        }
    }
    let row_start = top.max(0.0) as u32;
    let row_end = bottom.min(h).max(0.0) as u32;
    for y in (row_start..row_end).step_by(SAMPLE_STRIDE) {
        if region.x > pad {
            points.push((left.max(0.0) as u32, y));
        }
        if right < w {
            points.push((right.min(w - 1.0) as u32, y));
        }
    }

    let mut sums = [0u64; 4];
    let mut count = 0u64;
    for (x, y) in points {
        if x >= width || y >= height {
            continue;
        }
        let pixel = rgba.get_pixel(x, y).0;
        for (sum, channel) in sums.iter_mut().zip(pixel) {
            *sum += channel as u64;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(sums.map(|sum| (sum / count) as u8))
}

/// Most frequent color; the earliest wins ties. White when nothing was
/// sampled.
pub fn pick_fill_color(averages: &[[u8; 4]]) -> [u8; 4] {
    let mut counts: Vec<([u8; 4], usize)> = Vec::new();
    for color in averages {
        match counts.iter_mut().find(|(seen, _)| seen == color) {
            Some((_, count)) => *count += 1,
            None => counts.push((*color, 1)),
        }
    }
    let mut best: Option<([u8; 4], usize)> = None;
    for (color, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((color, count));
        }
    }
    best.map(|(color, _)| color).unwrap_or(WHITE)
}

impl TextEraser for RecolorEraser {
    fn name(&self) -> &'static str {
        "recolor"
    }

    fn erase<'a>(
        &'a self,
        image: &'a RasterImage,
        regions: &'a [TextRegion],
        _scratch: &'a Scratch,
    ) -> StageFuture<'a, RasterImage> {
        let erased = self.erase_now(image, regions);
        Box::pin(async move { erased })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::normalize_regions;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::json;

    fn regions(values: &[serde_json::Value]) -> Vec<TextRegion> {
        normalize_regions(values)
    }

    #[test]
    fn fill_prefers_most_common_then_first() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        assert_eq!(pick_fill_color(&[red, blue, blue]), blue);
        assert_eq!(pick_fill_color(&[red, blue]), red);
        assert_eq!(pick_fill_color(&[]), WHITE);
    }

    #[test]
    fn samples_surrounding_background() {
        let mut img = RgbImage::from_pixel(40, 40, Rgb([10, 20, 30]));
        for y in 15..20 {
            for x in 15..25 {
                img.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let image = RasterImage::from_dynamic(DynamicImage::ImageRgb8(img));
        let region = &regions(&[json!({"text": "ab", "x": 15, "y": 15, "width": 10, "height": 5})])[0];
        assert_eq!(
            sample_border_average(&image.to_rgba8(), region, 2),
            Some([10, 20, 30, 255])
        );
    }

    #[test]
    fn region_past_the_edge_samples_nothing() {
        let image = RasterImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(10, 10)));
        let region = &regions(&[json!({"text": "ab", "x": 30, "y": 30, "width": 5, "height": 5})])[0];
        assert_eq!(sample_border_average(&image.to_rgba8(), region, 2), None);
    }

    #[test]
    fn paints_padded_box_with_background() {
        let mut img = RgbImage::from_pixel(30, 20, Rgb([0, 128, 0]));
        for y in 8..12 {
            for x in 10..20 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let image = RasterImage::from_dynamic(DynamicImage::ImageRgb8(img));
        let found = regions(&[json!({"text": "ab", "x": 10, "y": 8, "width": 10, "height": 4})]);
        let erased = RecolorEraser::default().erase_now(&image, &found);
        assert_eq!(erased.mode(), image.mode());
        for y in 0..20 {
            for x in 0..30 {
                assert_eq!(erased.pixel_hex(x, y), "#008000", "({}, {})", x, y);
            }
        }
    }
}
