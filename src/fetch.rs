use anyhow::{Context, Result, anyhow};
use geo::{Area, BoundingRect};
use geo_types::{MultiPolygon, Polygon};
use owo_colors::OwoColorize;
use serde_json::json;

use crate::catalog::layer_name;
use crate::cli::{AreaOfInterest, FetchConfig, LayerSpec, PlanConfig};
use crate::constants::DEFAULT_MIN_AXIS_PIXELS;
use crate::dims::{GeoBounds, resolve_dims};
use crate::grid;
use crate::metadata::{RasterMetadata, write_metadata};
use crate::mosaic::{Mosaic, check_output_path};
use crate::progress::progress_bar;
use crate::split::split_geometry;
use crate::wms::{self, MapRequest};

pub fn run_fetch(config: &FetchConfig) -> Result<()> {
    let (geometry, area_crs) = resolve_area(&config.area)?;
    let crs = config
        .crs
        .clone()
        .or(area_crs)
        .ok_or_else(|| anyhow!("No CRS available for the requested area"))?;
    let layer = resolve_layer(&config.layer, config.resolution)?;
    check_output_path(&config.out, config.overwrite)?;

    let client = wms::build_client()?;
    if config.check_capabilities {
        let capabilities = wms::fetch_capabilities(&client, &config.url, &config.version)?;
        wms::ensure_layer(&capabilities, &layer, &config.format)?;
        println!(
            "{} Service offers layer '{}' as {}",
            "✔".green().bold(),
            layer,
            config.format
        );
    }

    let envelope = envelope_of(&geometry)?;
    let (bounds, width, height) = resolve_dims(
        envelope,
        config.resolution,
        config.padding,
        DEFAULT_MIN_AXIS_PIXELS,
    )?;
    println!(
        "{} Area of interest: X:[{:.3}..{:.3}] Y:[{:.3}..{:.3}] ({crs})",
        "ℹ".blue().bold(),
        bounds.min_x,
        bounds.max_x,
        bounds.min_y,
        bounds.max_y
    );
    println!(
        "  {} Output raster: {} x {} px at {} units/px",
        "⬚".blue(),
        width,
        height,
        config.resolution
    );

    let tiles = split_geometry(&geometry, config.resolution, config.max_len, config.buffer)?;
    println!(
        "{} Split area into {} request tile{}",
        "ℹ".blue().bold(),
        tiles.len(),
        if tiles.len() == 1 { "" } else { "s" }
    );

    let mut mosaic = Mosaic::new(bounds, config.resolution, width, height)?;
    let pb = progress_bar(tiles.len() as u64, "Fetching tiles");
    for tile in &tiles {
        let (tile_bounds, tile_width, tile_height) = tile_dims(tile, config.resolution)?;
        let request = MapRequest {
            url: &config.url,
            version: &config.version,
            layer: &layer,
            crs: &crs,
            format: &config.format,
            bounds: tile_bounds,
            width: tile_width,
            height: tile_height,
        };
        let image = wms::fetch_map(&client, &request, config.tries)?;
        mosaic.write_window(mosaic.window_for(&tile_bounds), &image);
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!(
        "{} Fetched {} tile{}",
        "✔".green().bold(),
        tiles.len(),
        if tiles.len() == 1 { "" } else { "s" }
    );

    mosaic
        .save(&config.out, &crs)
        .with_context(|| format!("Failed to write {}", config.out.display()))?;

    let metadata = RasterMetadata::new(
        &crs,
        &layer,
        config.resolution,
        bounds,
        width,
        height,
        tiles.len(),
    );
    let meta_path = write_metadata(&config.out, &metadata)?;

    println!(
        "{} {}",
        "✔".green().bold(),
        "Raster written".green().bold()
    );
    println!(
        "  {} {}",
        "Output:".bright_black(),
        config.out.display()
    );
    println!("  {} {}", "Metadata:".bright_black(), meta_path.display());
    println!(
        "  {} {:>6}    {} {:>10}",
        "Tiles".cyan().bold(),
        tiles.len(),
        "Pixels".cyan().bold(),
        width as u64 * height as u64
    );

    Ok(())
}

pub fn run_plan(config: &PlanConfig) -> Result<()> {
    let (geometry, _) = resolve_area(&config.area)?;
    let envelope = envelope_of(&geometry)?;
    let (bounds, width, height) = resolve_dims(
        envelope,
        config.resolution,
        None,
        DEFAULT_MIN_AXIS_PIXELS,
    )?;
    println!(
        "{} Full extent {} x {} px, X:[{:.3}..{:.3}] Y:[{:.3}..{:.3}]",
        "ℹ".blue().bold(),
        width,
        height,
        bounds.min_x,
        bounds.max_x,
        bounds.min_y,
        bounds.max_y
    );

    let tiles = split_geometry(&geometry, config.resolution, config.max_len, config.buffer)?;
    println!(
        "{} {} request tile{}:",
        "ℹ".blue().bold(),
        tiles.len(),
        if tiles.len() == 1 { "" } else { "s" }
    );
    for (index, tile) in tiles.iter().enumerate() {
        let (tile_bounds, tile_width, tile_height) = tile_dims(tile, config.resolution)?;
        println!(
            "  {:>3}  {} x {} px  X:[{:.3}..{:.3}] Y:[{:.3}..{:.3}]  area {:.1}",
            index,
            tile_width,
            tile_height,
            tile_bounds.min_x,
            tile_bounds.max_x,
            tile_bounds.min_y,
            tile_bounds.max_y,
            tile.unsigned_area()
        );
    }

    if let Some(path) = &config.out {
        let collection = tiles_to_geojson(&tiles);
        std::fs::write(path, serde_json::to_string_pretty(&collection)?)
            .with_context(|| format!("Failed to write tile plan {}", path.display()))?;
        println!(
            "{} Saved tile plan: {}",
            "ℹ".blue().bold(),
            path.display()
        );
    }

    Ok(())
}

fn resolve_area(area: &AreaOfInterest) -> Result<(MultiPolygon<f64>, Option<String>)> {
    match area {
        AreaOfInterest::Bounds(bounds) => {
            Ok((MultiPolygon::new(vec![bounds.to_polygon()]), None))
        }
        AreaOfInterest::GridCell { grid, cell } => {
            let system = grid::lookup(grid)?;
            let polygon = system.cell_polygon(cell)?;
            Ok((
                MultiPolygon::new(vec![polygon]),
                Some(system.crs.to_string()),
            ))
        }
    }
}

fn resolve_layer(layer: &LayerSpec, resolution: f64) -> Result<String> {
    match layer {
        LayerSpec::Named(name) => Ok(name.clone()),
        LayerSpec::Catalog {
            service,
            year,
            season,
            bands,
        } => layer_name(service, *year, resolution, season, bands),
    }
}

fn envelope_of(geometry: &MultiPolygon<f64>) -> Result<GeoBounds> {
    let rect = geometry
        .bounding_rect()
        .ok_or_else(|| anyhow!("Area of interest has no extent"))?;
    Ok(GeoBounds::from_rect(rect))
}

fn tile_dims(tile: &Polygon<f64>, resolution: f64) -> Result<(GeoBounds, u32, u32)> {
    let rect = tile
        .bounding_rect()
        .ok_or_else(|| anyhow!("Tile has no extent"))?;
    let resolved = resolve_dims(
        GeoBounds::from_rect(rect),
        resolution,
        None,
        DEFAULT_MIN_AXIS_PIXELS,
    )?;
    Ok(resolved)
}

fn tiles_to_geojson(tiles: &[Polygon<f64>]) -> serde_json::Value {
    let features: Vec<serde_json::Value> = tiles
        .iter()
        .enumerate()
        .map(|(index, tile)| {
            let mut rings = vec![ring_coords(tile.exterior())];
            rings.extend(tile.interiors().iter().map(ring_coords));
            json!({
                "type": "Feature",
                "properties": { "tile": index },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": rings,
                },
            })
        })
        .collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn ring_coords(ring: &geo_types::LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|coord| [coord.x, coord.y]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::AreaOfInterest;

    #[test]
    fn grid_area_carries_its_crs() {
        let area = AreaOfInterest::GridCell {
            grid: "dk1".to_string(),
            cell: "1km_6210_720".to_string(),
        };
        let (geometry, crs) = resolve_area(&area).unwrap();
        assert_eq!(crs.as_deref(), Some("EPSG:25832"));
        assert_eq!(geometry.0.len(), 1);
        assert!((geometry.unsigned_area() - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn plan_geojson_has_one_feature_per_tile() {
        let tiles = vec![
            GeoBounds::new(0.0, 0.0, 10.0, 10.0).unwrap().to_polygon(),
            GeoBounds::new(10.0, 0.0, 20.0, 10.0).unwrap().to_polygon(),
        ];
        let collection = tiles_to_geojson(&tiles);
        assert_eq!(collection["type"], "FeatureCollection");
        assert_eq!(collection["features"].as_array().unwrap().len(), 2);
        assert_eq!(collection["features"][1]["properties"]["tile"], 1);
        let ring = &collection["features"][0]["geometry"]["coordinates"][0];
        assert_eq!(ring.as_array().unwrap().len(), 5);
    }
}
