use image::{Rgba, RgbaImage};

use crate::region::TextRegion;

const KEEP: Rgba<u8> = Rgba([0, 0, 0, 0]);
const EDIT: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Edit mask for the image-editing endpoint: padded text boxes are opaque
/// (repaint), everything else fully transparent (keep).
pub fn build_edit_mask(width: u32, height: u32, regions: &[TextRegion], padding: u32) -> RgbaImage {
    let mut mask = RgbaImage::from_pixel(width, height, KEEP);
    for region in regions {
        let Some((x0, y0, x1, y1)) = region.padded_bounds(padding, width, height) else {
            continue;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, EDIT);
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::normalize_regions;
    use serde_json::json;

    #[test]
    fn opaque_only_inside_padded_boxes() {
        let regions = normalize_regions(&[json!({
            "text": "Hi", "x": 4, "y": 4, "width": 4, "height": 2
        })]);
        let mask = build_edit_mask(16, 12, &regions, 2);
        assert_eq!(mask.dimensions(), (16, 12));
        assert_eq!(mask.get_pixel(2, 2).0[3], 255);
        assert_eq!(mask.get_pixel(9, 7).0[3], 255);
        assert_eq!(mask.get_pixel(10, 7).0[3], 0);
        assert_eq!(mask.get_pixel(1, 2).0[3], 0);
        let opaque = mask.pixels().filter(|pixel| pixel.0[3] == 255).count();
        assert_eq!(opaque, 8 * 6);
    }
}
