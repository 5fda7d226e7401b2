use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use image::RgbImage;
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::dims::GeoBounds;

/// In-memory RGB canvas spanning georeferenced bounds at a fixed
/// resolution, written out as a GeoTIFF once every tile is pasted.
/// Unwritten pixels stay at the nodata value 0.
pub struct Mosaic {
    bounds: GeoBounds,
    resolution: f64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Top-left pixel offset of a tile within the mosaic. Offsets may be
/// negative when minimum-size padding pushed a tile past the canvas edge;
/// pasting clips accordingly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: i64,
    pub row_off: i64,
}

impl Mosaic {
    pub fn new(bounds: GeoBounds, resolution: f64, width: u32, height: u32) -> Result<Self> {
        let size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|count| count.checked_mul(3))
            .ok_or_else(|| anyhow!("Mosaic dimensions {width}x{height} are too large"))?;
        Ok(Self {
            bounds,
            resolution,
            width,
            height,
            pixels: vec![0; size],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel window for a tile's bounds, derived from the mosaic transform
    /// with the raster origin at the top-left corner (min_x, max_y).
    pub fn window_for(&self, tile: &GeoBounds) -> PixelWindow {
        PixelWindow {
            col_off: ((tile.min_x - self.bounds.min_x) / self.resolution).round() as i64,
            row_off: ((self.bounds.max_y - tile.max_y) / self.resolution).round() as i64,
        }
    }

    /// Pastes an image at the window, clipping whatever falls outside the
    /// canvas.
    pub fn write_window(&mut self, window: PixelWindow, image: &RgbImage) {
        for y in 0..image.height() {
            let row = window.row_off + y as i64;
            if row < 0 || row >= self.height as i64 {
                continue;
            }
            for x in 0..image.width() {
                let col = window.col_off + x as i64;
                if col < 0 || col >= self.width as i64 {
                    continue;
                }
                let offset = (row as usize * self.width as usize + col as usize) * 3;
                let pixel = image.get_pixel(x, y).0;
                self.pixels[offset..offset + 3].copy_from_slice(&pixel);
            }
        }
    }

    /// Encodes the canvas as a striped RGB GeoTIFF with the transform and
    /// CRS tags downstream GIS tooling expects.
    pub fn save(&self, path: &Path, crs: &str) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output raster {}", path.display()))?;
        let mut encoder =
            TiffEncoder::new(BufWriter::new(file)).context("Failed to start TIFF encoder")?;
        let mut image = encoder
            .new_image::<colortype::RGB8>(self.width, self.height)
            .context("Failed to start TIFF image directory")?;

        image
            .encoder()
            .write_tag(
                Tag::ModelPixelScaleTag,
                &[self.resolution, self.resolution, 0.0][..],
            )
            .context("Failed to write pixel scale tag")?;
        image
            .encoder()
            .write_tag(
                Tag::ModelTiepointTag,
                &[0.0, 0.0, 0.0, self.bounds.min_x, self.bounds.max_y, 0.0][..],
            )
            .context("Failed to write tiepoint tag")?;
        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &geo_key_directory(crs)[..])
            .context("Failed to write GeoKey directory")?;
        image
            .encoder()
            .write_tag(Tag::GdalNodata, "0")
            .context("Failed to write nodata tag")?;

        image
            .write_data(&self.pixels)
            .with_context(|| format!("Failed to write raster data to {}", path.display()))?;
        Ok(())
    }
}

/// Minimal GeoKey directory: projected model, PixelIsArea, and the EPSG
/// code when the CRS is written as `EPSG:<code>`.
fn geo_key_directory(crs: &str) -> Vec<u16> {
    let mut keys = vec![(1024u16, 1u16), (1025, 1)];
    if let Some(code) = epsg_code(crs) {
        keys.push((3072, code));
    }
    let mut directory = vec![1u16, 1, 0, keys.len() as u16];
    for (key, value) in keys {
        directory.extend_from_slice(&[key, 0, 1, value]);
    }
    directory
}

fn epsg_code(crs: &str) -> Option<u16> {
    let (authority, code) = crs.split_once(':')?;
    if !authority.eq_ignore_ascii_case("epsg") {
        return None;
    }
    code.trim().parse().ok()
}

/// Refuses to overwrite an existing file unless asked to.
pub fn check_output_path(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!(
            "Output file {} already exists (pass --overwrite to replace it)",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mosaic() -> Mosaic {
        Mosaic::new(
            GeoBounds::new(1000.0, 2000.0, 1100.0, 2080.0).unwrap(),
            1.0,
            100,
            80,
        )
        .unwrap()
    }

    #[test]
    fn window_origin_is_top_left() {
        let mosaic = mosaic();
        let full = mosaic.window_for(&GeoBounds::new(1000.0, 2000.0, 1100.0, 2080.0).unwrap());
        assert_eq!(
            full,
            PixelWindow {
                col_off: 0,
                row_off: 0
            }
        );
        // A tile at the south-east corner starts at the bottom-right.
        let corner = mosaic.window_for(&GeoBounds::new(1090.0, 2000.0, 1100.0, 2010.0).unwrap());
        assert_eq!(
            corner,
            PixelWindow {
                col_off: 90,
                row_off: 70
            }
        );
    }

    #[test]
    fn padded_tiles_get_negative_offsets() {
        let mosaic = mosaic();
        let padded = mosaic.window_for(&GeoBounds::new(990.0, 2000.0, 1010.0, 2090.0).unwrap());
        assert_eq!(
            padded,
            PixelWindow {
                col_off: -10,
                row_off: -10
            }
        );
    }

    #[test]
    fn pasting_clips_at_canvas_edges() {
        let mut mosaic = mosaic();
        let image = RgbImage::from_pixel(20, 20, image::Rgb([7, 8, 9]));
        mosaic.write_window(
            PixelWindow {
                col_off: -10,
                row_off: -10,
            },
            &image,
        );
        // Pixel (0, 0) received the overlapping quarter of the image.
        assert_eq!(&mosaic.pixels[0..3], &[7, 8, 9]);
        // Pixel (10, 10) is past the pasted area and still nodata.
        let offset = (10 * 100 + 10) * 3;
        assert_eq!(&mosaic.pixels[offset..offset + 3], &[0, 0, 0]);
    }

    #[test]
    fn geo_keys_include_epsg_when_parseable() {
        let directory = geo_key_directory("EPSG:25832");
        assert_eq!(directory[0..4], [1, 1, 0, 3]);
        assert!(directory.chunks(4).any(|chunk| chunk == [3072, 0, 1, 25832]));

        let no_epsg = geo_key_directory("urn:ogc:def:crs:whatever");
        assert_eq!(no_epsg[0..4], [1, 1, 0, 2]);
    }
}
