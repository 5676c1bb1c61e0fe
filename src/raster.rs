use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Pixel layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMode {
    Rgb,
    Rgba,
    Luma,
}

impl PixelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelMode::Rgb => "RGB",
            PixelMode::Rgba => "RGBA",
            PixelMode::Luma => "L",
        }
    }
}

/// Owned pixel buffer passed between pipeline stages. Derived images are
/// always new values.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).with_context(|| "failed to decode image")?;
        Ok(Self::from_dynamic(image))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    /// Folds every decoded layout into one of the three supported modes.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let image = match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) | DynamicImage::ImageLuma8(_) => {
                image
            }
            DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
            other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn mode(&self) -> PixelMode {
        match self.image {
            DynamicImage::ImageRgba8(_) => PixelMode::Rgba,
            DynamicImage::ImageLuma8(_) => PixelMode::Luma,
            _ => PixelMode::Rgb,
        }
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    /// Packs an RGBA buffer back into this image's mode.
    pub fn with_rgba(&self, rgba: RgbaImage) -> Self {
        let image = DynamicImage::ImageRgba8(rgba);
        let image = match self.mode() {
            PixelMode::Rgba => image,
            PixelMode::Rgb => DynamicImage::ImageRgb8(image.to_rgb8()),
            PixelMode::Luma => DynamicImage::ImageLuma8(image.to_luma8()),
        };
        Self { image }
    }

    pub fn resized(&self, width: u32, height: u32) -> Self {
        let image = self
            .image
            .resize_exact(width, height, image::imageops::FilterType::Lanczos3);
        Self { image }
    }

    /// `#rrggbb` of the pixel at `(x, y)`, clamped into the image.
    pub fn pixel_hex(&self, x: u32, y: u32) -> String {
        let x = x.min(self.width().saturating_sub(1));
        let y = y.min(self.height().saturating_sub(1));
        let [r, g, b, _] = self.image.get_pixel(x, y).0;
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        self.encode(ImageFormat::Png)
    }

    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let image = match format {
            ImageFormat::Jpeg if self.image.color().has_alpha() => {
                DynamicImage::ImageRgb8(self.image.to_rgb8())
            }
            _ => self.image.clone(),
        };
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .with_context(|| format!("failed to encode image as {:?}", format))?;
        Ok(bytes)
    }

    pub fn write_png(&self, path: &Path) -> Result<()> {
        let bytes = self.to_png()?;
        std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    #[test]
    fn keeps_supported_modes() {
        let rgb = RasterImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(4, 3)));
        assert_eq!(rgb.mode(), PixelMode::Rgb);
        assert_eq!(rgb.dimensions(), (4, 3));

        let la = DynamicImage::ImageLumaA8(image::GrayAlphaImage::new(2, 2));
        assert_eq!(RasterImage::from_dynamic(la).mode(), PixelMode::Rgba);
    }

    #[test]
    fn png_bytes_decode_back() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(1, 1, Rgb([255, 0, 16]));
        let raster = RasterImage::from_dynamic(DynamicImage::ImageRgb8(img));
        let decoded = RasterImage::from_bytes(&raster.to_png().unwrap()).unwrap();
        assert_eq!(decoded.pixel_hex(1, 1), "#ff0010");
        assert_eq!(decoded.pixel_hex(99, 99), "#000000");
    }

    #[test]
    fn with_rgba_restores_mode() {
        let raster = RasterImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(2, 2)));
        let mut rgba = raster.to_rgba8();
        rgba.put_pixel(0, 0, Rgba([1, 2, 3, 255]));
        let restored = raster.with_rgba(rgba);
        assert_eq!(restored.mode(), PixelMode::Rgb);
        assert_eq!(restored.pixel_hex(0, 0), "#010203");
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(RasterImage::from_bytes(b"not an image").is_err());
    }
}
