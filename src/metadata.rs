use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::META_SUFFIX;
use crate::dims::GeoBounds;

/// Sidecar description of a written raster, for tooling that wants the
/// extent without opening the TIFF.
#[derive(Serialize, Deserialize)]
pub struct RasterMetadata {
    pub crs: String,
    pub layer: String,
    pub resolution: f64,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub width: u32,
    pub height: u32,
    pub tiles: usize,
}

impl RasterMetadata {
    pub fn new(
        crs: &str,
        layer: &str,
        resolution: f64,
        bounds: GeoBounds,
        width: u32,
        height: u32,
        tiles: usize,
    ) -> Self {
        Self {
            crs: crs.to_string(),
            layer: layer.to_string(),
            resolution,
            min_x: bounds.min_x,
            min_y: bounds.min_y,
            max_x: bounds.max_x,
            max_y: bounds.max_y,
            width,
            height,
            tiles,
        }
    }
}

pub fn write_metadata(raster: &Path, metadata: &RasterMetadata) -> Result<PathBuf> {
    let path = metadata_path(raster);
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write metadata {}", path.display()))?;
    Ok(path)
}

pub fn load_metadata(raster: &Path) -> Result<RasterMetadata> {
    let path = metadata_path(raster);
    let data = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read metadata {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse metadata {}", path.display()))
}

pub fn metadata_path(raster: &Path) -> PathBuf {
    raster.with_extension(META_SUFFIX)
}
