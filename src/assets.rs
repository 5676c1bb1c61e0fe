use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::raster::RasterImage;

/// Flat directory of generated rasters and SVG documents.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Re-encodes `bytes` as `format` and stores it; returns the file name.
    pub fn save_image(&self, bytes: &[u8], prefix: &str, format: ImageFormat) -> Result<String> {
        let image = RasterImage::from_bytes(bytes)?;
        self.save_raster(&image, prefix, format)
    }

    pub fn save_raster(&self, image: &RasterImage, prefix: &str, format: ImageFormat) -> Result<String> {
        let ext = format.extensions_str().first().copied().unwrap_or("png");
        let name = self.next_name(prefix, ext);
        let encoded = image.encode(format)?;
        self.write(&name, encoded.as_slice())?;
        info!("image saved: {}", name);
        Ok(name)
    }

    pub fn save_svg(&self, code: &str, prefix: &str) -> Result<String> {
        let name = self.next_name(prefix, "svg");
        self.write(&name, code.as_bytes())?;
        info!("SVG saved: {}", name);
        Ok(name)
    }

    pub fn save_json(&self, value: &serde_json::Value, prefix: &str) -> Result<String> {
        let name = self.next_name(prefix, "json");
        let body = serde_json::to_vec_pretty(value).with_context(|| "failed to serialize JSON")?;
        self.write(&name, &body)?;
        Ok(name)
    }

    fn next_name(&self, prefix: &str, ext: &str) -> String {
        asset_file_name(prefix, ext, OffsetDateTime::now_utc(), Uuid::new_v4())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(name);
        std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// `{prefix}_{yyyyMMdd_HHmmss}_{8 hex}.{ext}`
pub fn asset_file_name(prefix: &str, ext: &str, now: OffsetDateTime, id: Uuid) -> String {
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| "00000000_000000".to_string());
    let hex = id.simple().to_string();
    format!("{}_{}_{}.{}", prefix, stamp, &hex[..8], ext.to_lowercase())
}
