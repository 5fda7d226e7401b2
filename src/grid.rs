use anyhow::{Context, Result, bail};
use geo_types::Polygon;

use crate::dims::GeoBounds;

/// A built-in national grid whose cells are addressed by a
/// `<prefix>_<northing>_<easting>` index with both numbers in multiples of
/// the cell size, e.g. `1km_6210_720` for the cell at N 6210 km, E 720 km.
pub struct GridSystem {
    pub name: &'static str,
    pub crs: &'static str,
    prefix: &'static str,
    cell_size_m: f64,
}

/// Danish Kvadratnet, 1 km cells, EUREF89 / UTM zone 32N.
static DK_1KM: GridSystem = GridSystem {
    name: "dk1km",
    crs: "EPSG:25832",
    prefix: "1km",
    cell_size_m: 1_000.0,
};

/// Danish Kvadratnet, 10 km cells.
static DK_10KM: GridSystem = GridSystem {
    name: "dk10km",
    crs: "EPSG:25832",
    prefix: "10km",
    cell_size_m: 10_000.0,
};

pub fn lookup(grid: &str) -> Result<&'static GridSystem> {
    match grid.to_ascii_lowercase().as_str() {
        "dk1" | "dk1km" => Ok(&DK_1KM),
        "dk10" | "dk10km" => Ok(&DK_10KM),
        other => bail!("Unknown grid system '{other}' (available: dk1, dk10)"),
    }
}

impl GridSystem {
    /// Bounds of the cell named by `index`; the size prefix is optional.
    pub fn cell_bounds(&self, index: &str) -> Result<GeoBounds> {
        let body = index
            .strip_prefix(self.prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(index);
        let (northing, easting) = body.split_once('_').with_context(|| {
            format!(
                "Grid index '{index}' must look like {}_<northing>_<easting>",
                self.prefix
            )
        })?;
        let northing: u32 = northing
            .parse()
            .with_context(|| format!("Invalid northing '{northing}' in grid index '{index}'"))?;
        let easting: u32 = easting
            .parse()
            .with_context(|| format!("Invalid easting '{easting}' in grid index '{index}'"))?;

        let min_x = easting as f64 * self.cell_size_m;
        let min_y = northing as f64 * self.cell_size_m;
        GeoBounds::new(
            min_x,
            min_y,
            min_x + self.cell_size_m,
            min_y + self.cell_size_m,
        )
        .map_err(Into::into)
    }

    pub fn cell_polygon(&self, index: &str) -> Result<Polygon<f64>> {
        Ok(self.cell_bounds(index)?.to_polygon())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_km_cell_resolves_to_meters() {
        let grid = lookup("dk1").unwrap();
        let bounds = grid.cell_bounds("1km_6210_720").unwrap();
        assert_eq!(bounds, GeoBounds::new(720_000.0, 6_210_000.0, 721_000.0, 6_211_000.0).unwrap());
    }

    #[test]
    fn prefix_is_optional() {
        let grid = lookup("dk1km").unwrap();
        assert_eq!(
            grid.cell_bounds("6210_720").unwrap(),
            grid.cell_bounds("1km_6210_720").unwrap()
        );
    }

    #[test]
    fn ten_km_cells_scale() {
        let grid = lookup("dk10").unwrap();
        let bounds = grid.cell_bounds("10km_621_72").unwrap();
        assert_eq!(
            bounds,
            GeoBounds::new(720_000.0, 6_210_000.0, 730_000.0, 6_220_000.0).unwrap()
        );
        assert_eq!(grid.crs, "EPSG:25832");
    }

    #[test]
    fn rejects_unknown_grid_and_bad_index() {
        assert!(lookup("se1").is_err());
        let grid = lookup("dk1").unwrap();
        assert!(grid.cell_bounds("6210").is_err());
        assert!(grid.cell_bounds("abc_def").is_err());
    }
}
