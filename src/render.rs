use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{fontdb, Options, Tree};

use crate::raster::RasterImage;
use crate::region::TextRegion;
use crate::svg::{escape_xml, format_number, SVG_NS, XLINK_NS};

/// Source image with a red outline around every detected region.
pub fn region_overlay_svg(image: &RasterImage, regions: &[TextRegion]) -> Result<String> {
    let png = image.to_png()?;
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(png));
    let (width, height) = image.dimensions();

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="{ns}" xmlns:xlink="{xlink}" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        ns = SVG_NS,
        xlink = XLINK_NS,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));
    for region in regions {
        svg.push_str(&format!(
            r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="#ff0000" stroke-width="2"><title>{text}</title></rect>"##,
            x = format_number(region.x),
            y = format_number(region.y),
            w = format_number(region.width),
            h = format_number(region.height),
            text = escape_xml(&region.text)
        ));
    }
    svg.push_str("</svg>");
    Ok(svg)
}

pub fn render_region_overlay(image: &RasterImage, regions: &[TextRegion]) -> Result<Vec<u8>> {
    render_svg_png(&region_overlay_svg(image, regions)?)
}

/// Rasterizes an SVG document to PNG with the system fonts loaded.
pub fn render_svg_png(svg: &str) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode PNG from SVG")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::normalize_regions;
    use image::{DynamicImage, RgbImage};
    use serde_json::json;

    #[test]
    fn renders_svg_at_document_size() {
        let png = render_svg_png(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="30" height="20" viewBox="0 0 30 20"><rect width="30" height="20" fill="#00ff00"/></svg>"##,
        )
        .unwrap();
        let raster = RasterImage::from_bytes(&png).unwrap();
        assert_eq!(raster.dimensions(), (30, 20));
        assert_eq!(raster.pixel_hex(15, 10), "#00ff00");
    }

    #[test]
    fn overlay_outlines_regions() {
        let image = RasterImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(20, 10)));
        let regions = normalize_regions(&[json!({"text": "A&B", "x": 2, "y": 1, "width": 8, "height": 4})]);
        let svg = region_overlay_svg(&image, &regions).unwrap();
        assert!(svg.contains(r#"<rect x="2" y="1" width="8" height="4""#));
        assert!(svg.contains("<title>A&amp;B</title>"));
        let png = render_region_overlay(&image, &regions).unwrap();
        assert_eq!(RasterImage::from_bytes(&png).unwrap().dimensions(), (20, 10));
    }

    #[test]
    fn invalid_svg_is_an_error() {
        assert!(render_svg_png("<nope>").is_err());
    }
}
