use geo::algorithm::intersects::Intersects;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Area, BooleanOps, BoundingRect};
use geo_types::{Line, LineString, MultiPolygon, Polygon};

use crate::buffer::buffer_polygon;
use crate::constants::DEFAULT_MIN_AXIS_PIXELS;
use crate::dims::{GeoBounds, resolve_dims};
use crate::error::{GeomError, Result};
use crate::polygonize::polygonize;

/// Reconstruction noise below this area (squared georeferenced units) is
/// discarded outright.
const NOISE_AREA: f64 = 1.0;
/// Regions overlapping the input by no more than this lie (almost) fully
/// outside it and are reconstruction artifacts of concave shapes.
const OUTSIDE_AREA: f64 = 10.0;
/// Regions below this area are slivers to be absorbed by a neighbor.
const SLIVER_AREA: f64 = 100.0;

const TOUCH_AREA_TOL: f64 = 1e-9;

enum CutLine {
    Vertical(f64),
    Horizontal(f64),
}

/// Splits a polygon geometry into neighboring sub-polygons whose pixel
/// extent at `resolution` stays within `max_axis_pixels` on both axes.
///
/// Geometry already within the budget is returned untouched. Otherwise the
/// input is cut along evenly spaced axis lines, the enclosed regions are
/// reconstructed from the union of all fragment boundaries, degenerate
/// fragments are filtered or absorbed into a touching tile, and finally
/// every tile is grown by `overlap_buffer` georeferenced units (mitered, so
/// corners stay sharp) to give downstream mosaicking seam overlap.
pub fn split_geometry(
    geometry: &MultiPolygon<f64>,
    resolution: f64,
    max_axis_pixels: u32,
    overlap_buffer: f64,
) -> Result<Vec<Polygon<f64>>> {
    if max_axis_pixels == 0 {
        return Err(GeomError::InvalidArgument(
            "max_axis_pixels must be at least 1".to_string(),
        ));
    }
    if !overlap_buffer.is_finite() || overlap_buffer < 0.0 {
        return Err(GeomError::InvalidArgument(format!(
            "overlap_buffer {overlap_buffer} must be finite and non-negative"
        )));
    }
    validate_geometry(geometry)?;

    let envelope = geometry
        .bounding_rect()
        .ok_or_else(|| GeomError::InvalidGeometry("geometry has no extent".to_string()))?;
    let (bounds, width, height) = resolve_dims(
        GeoBounds::from_rect(envelope),
        resolution,
        None,
        DEFAULT_MIN_AXIS_PIXELS,
    )?;

    if width <= max_axis_pixels && height <= max_axis_pixels {
        return Ok(geometry.0.clone());
    }

    let cuts = cut_lines(&bounds, resolution, max_axis_pixels, width, height);

    // Each cut splits the original input independently; the union of every
    // fragment boundary is then re-polygonized. Folding the cuts one after
    // another instead would accumulate adjacency artifacts where the lines
    // intersect.
    let mut boundaries: Vec<Line<f64>> = Vec::new();
    for cut in &cuts {
        for fragment in split_by_cut(geometry, cut, &bounds) {
            collect_boundary(&fragment, &mut boundaries);
        }
    }

    let regions = polygonize(boundaries)?;

    let mut tiles: Vec<Polygon<f64>> = Vec::new();
    let mut slivers: Vec<Polygon<f64>> = Vec::new();
    for region in regions {
        let area = region.unsigned_area();
        if area <= NOISE_AREA {
            continue;
        }
        let inside = MultiPolygon::new(vec![region.clone()])
            .intersection(geometry)
            .unsigned_area();
        if inside <= OUTSIDE_AREA {
            continue;
        }
        if area < SLIVER_AREA {
            slivers.push(region);
        } else {
            tiles.push(region);
        }
    }

    // Absorb each sliver into the lowest-indexed touching tile; tile order
    // is stable, which keeps merges reproducible. A sliver touching nothing
    // is dropped (its overlap with the input is at most SLIVER_AREA).
    for sliver in slivers {
        let neighbor = tiles.iter().position(|tile| touches(tile, &sliver));
        if let Some(index) = neighbor {
            let merged = tiles[index].union(&sliver);
            let largest = merged.0.into_iter().max_by(|a, b| {
                a.unsigned_area()
                    .partial_cmp(&b.unsigned_area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            tiles[index] = largest.ok_or_else(|| {
                GeomError::OpFailure("sliver union produced an empty geometry".to_string())
            })?;
        }
    }

    if overlap_buffer > 0.0 {
        tiles = tiles
            .iter()
            .map(|tile| buffer_polygon(tile, overlap_buffer))
            .collect::<Result<Vec<_>>>()?;
    }

    Ok(tiles)
}

/// Evenly spaced interior cut lines, verticals first, ascending coordinate.
fn cut_lines(
    bounds: &GeoBounds,
    resolution: f64,
    max_axis_pixels: u32,
    width: u32,
    height: u32,
) -> Vec<CutLine> {
    let mut cuts = Vec::new();
    if width > max_axis_pixels {
        let spans = (bounds.width() / resolution / max_axis_pixels as f64).ceil() as usize;
        for i in 1..spans {
            cuts.push(CutLine::Vertical(
                bounds.min_x + i as f64 * bounds.width() / spans as f64,
            ));
        }
    }
    if height > max_axis_pixels {
        let spans = (bounds.height() / resolution / max_axis_pixels as f64).ceil() as usize;
        for i in 1..spans {
            cuts.push(CutLine::Horizontal(
                bounds.min_y + i as f64 * bounds.height() / spans as f64,
            ));
        }
    }
    cuts
}

/// Splits the geometry along one axis line by clipping it against the two
/// half-planes on either side, realized as rectangles padded out past the
/// envelope. Both rectangles share the cut edge exactly, so the fragment
/// boundaries they produce coincide along the cut.
fn split_by_cut(
    geometry: &MultiPolygon<f64>,
    cut: &CutLine,
    bounds: &GeoBounds,
) -> Vec<Polygon<f64>> {
    let margin = (bounds.width().max(bounds.height()) * 0.01).max(1.0);
    let outer = bounds.expanded(margin, margin);
    let (first, second) = match *cut {
        CutLine::Vertical(x) => (
            GeoBounds {
                min_x: outer.min_x,
                min_y: outer.min_y,
                max_x: x,
                max_y: outer.max_y,
            },
            GeoBounds {
                min_x: x,
                min_y: outer.min_y,
                max_x: outer.max_x,
                max_y: outer.max_y,
            },
        ),
        CutLine::Horizontal(y) => (
            GeoBounds {
                min_x: outer.min_x,
                min_y: outer.min_y,
                max_x: outer.max_x,
                max_y: y,
            },
            GeoBounds {
                min_x: outer.min_x,
                min_y: y,
                max_x: outer.max_x,
                max_y: outer.max_y,
            },
        ),
    };

    let mut fragments = Vec::new();
    for half in [first, second] {
        let clip = MultiPolygon::new(vec![half.to_polygon()]);
        fragments.extend(geometry.intersection(&clip).0);
    }
    fragments
}

fn collect_boundary(polygon: &Polygon<f64>, out: &mut Vec<Line<f64>>) {
    out.extend(polygon.exterior().lines());
    for ring in polygon.interiors() {
        out.extend(ring.lines());
    }
}

/// Two polygons touch when they share boundary points but their interiors
/// do not overlap.
fn touches(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    if !a.intersects(b) {
        return false;
    }
    let overlap = MultiPolygon::new(vec![a.clone()])
        .intersection(&MultiPolygon::new(vec![b.clone()]))
        .unsigned_area();
    overlap < TOUCH_AREA_TOL
}

fn validate_geometry(geometry: &MultiPolygon<f64>) -> Result<()> {
    if geometry.0.is_empty() {
        return Err(GeomError::InvalidGeometry(
            "geometry is empty".to_string(),
        ));
    }
    for polygon in geometry {
        validate_ring(polygon.exterior(), "exterior ring")?;
        for (index, ring) in polygon.interiors().iter().enumerate() {
            validate_ring(ring, &format!("interior ring {index}"))?;
        }
    }
    if geometry.unsigned_area() == 0.0 {
        return Err(GeomError::InvalidGeometry(
            "geometry has zero area".to_string(),
        ));
    }
    Ok(())
}

/// Rejects rings with too few vertices, non-finite coordinates, repeated
/// (non-consecutive) vertices, or properly crossing edges.
fn validate_ring(ring: &LineString<f64>, label: &str) -> Result<()> {
    let coords = &ring.0;
    if coords.len() < 4 {
        return Err(GeomError::InvalidGeometry(format!(
            "{label} must have at least 3 distinct vertices"
        )));
    }
    for coord in coords {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(GeomError::InvalidGeometry(format!(
                "{label} has a non-finite coordinate"
            )));
        }
    }

    let closed = coords.first() == coords.last();
    let count = if closed { coords.len() - 1 } else { coords.len() };

    for i in 0..count {
        for j in (i + 2)..count {
            if i == 0 && j == count - 1 {
                continue;
            }
            if coords[i] == coords[j] {
                return Err(GeomError::InvalidGeometry(format!(
                    "{label} touches itself at ({}, {})",
                    coords[i].x, coords[i].y
                )));
            }
        }
    }

    for i in 0..count {
        let edge_i = Line::new(coords[i], coords[(i + 1) % coords.len()]);
        for j in (i + 2)..count {
            if i == 0 && j == count - 1 {
                continue;
            }
            let edge_j = Line::new(coords[j], coords[(j + 1) % coords.len()]);
            match line_intersection(edge_i, edge_j) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    let endpoint_i = intersection == edge_i.start || intersection == edge_i.end;
                    let endpoint_j = intersection == edge_j.start || intersection == edge_j.end;
                    if !(endpoint_i && endpoint_j) {
                        return Err(GeomError::InvalidGeometry(format!(
                            "{label} has a self-intersection at ({}, {})",
                            intersection.x, intersection.y
                        )));
                    }
                }
                Some(LineIntersection::Collinear { .. }) => {
                    return Err(GeomError::InvalidGeometry(format!(
                        "{label} has overlapping edges"
                    )));
                }
                None => {}
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, polygon};

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
        GeoBounds::new(min_x, min_y, max_x, max_y)
            .unwrap()
            .to_polygon()
    }

    fn multi(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
        MultiPolygon::new(polygons)
    }

    fn tile_extent(tile: &Polygon<f64>, resolution: f64) -> (u32, u32) {
        let envelope = tile.bounding_rect().unwrap();
        let (_, width, height) =
            resolve_dims(GeoBounds::from_rect(envelope), resolution, None, 256).unwrap();
        (width, height)
    }

    #[test]
    fn small_geometry_is_returned_unchanged() {
        let input = rect(0.0, 0.0, 1000.0, 1000.0);
        let tiles = split_geometry(&multi(vec![input.clone()]), 1.0, 4000, 0.0).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0], input);
    }

    #[test]
    fn large_square_splits_into_bounded_tiles() {
        let input = rect(0.0, 0.0, 20000.0, 20000.0);
        let tiles = split_geometry(&multi(vec![input]), 1.0, 4000, 0.0).unwrap();

        assert_eq!(tiles.len(), 25);
        let mut total = 0.0;
        for tile in &tiles {
            let (width, height) = tile_extent(tile, 1.0);
            assert!(width <= 4000, "tile width {width} exceeds budget");
            assert!(height <= 4000, "tile height {height} exceeds budget");
            assert!(tile.unsigned_area() >= SLIVER_AREA);
            total += tile.unsigned_area();
        }
        // Tiles partition the square, so their areas sum to it exactly.
        assert!((total - 4.0e8).abs() < 1.0, "coverage lost: {total}");
    }

    #[test]
    fn wide_strip_splits_along_one_axis() {
        let input = rect(0.0, 0.0, 9000.0, 1000.0);
        let tiles = split_geometry(&multi(vec![input]), 1.0, 4000, 0.0).unwrap();
        assert_eq!(tiles.len(), 3);
        for tile in &tiles {
            let (width, height) = tile_extent(tile, 1.0);
            assert!(width <= 4000);
            assert!(height <= 4000);
            assert!((tile.unsigned_area() - 3000.0 * 1000.0).abs() < 1e-3);
        }
    }

    #[test]
    fn concave_input_keeps_full_coverage() {
        let input: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 20000.0, y: 0.0),
            (x: 20000.0, y: 10000.0),
            (x: 10000.0, y: 10000.0),
            (x: 10000.0, y: 20000.0),
            (x: 0.0, y: 20000.0),
            (x: 0.0, y: 0.0),
        ];
        let expected = input.unsigned_area();
        let tiles = split_geometry(&multi(vec![input]), 1.0, 4000, 0.0).unwrap();

        assert!(tiles.len() > 1);
        let mut total = 0.0;
        for tile in &tiles {
            let (width, height) = tile_extent(tile, 1.0);
            assert!(width <= 4000);
            assert!(height <= 4000);
            assert!(tile.unsigned_area() >= SLIVER_AREA);
            total += tile.unsigned_area();
        }
        assert!(
            (total - expected).abs() < 1.0,
            "coverage {total} != {expected}"
        );
    }

    #[test]
    fn sliver_is_absorbed_by_a_touching_tile() {
        // The first part extends 0.05 units past the cut at x = 3000, so
        // reconstruction yields a 50-square-unit strip there.
        let parts = multi(vec![
            rect(0.0, 0.0, 3000.05, 1000.0),
            rect(6000.0, 0.0, 9000.0, 1000.0),
        ]);
        let expected = parts.unsigned_area();
        let tiles = split_geometry(&parts, 1.0, 4000, 0.0).unwrap();

        assert_eq!(tiles.len(), 2, "sliver must not survive as its own tile");
        for tile in &tiles {
            assert!(tile.unsigned_area() >= SLIVER_AREA);
        }
        let total: f64 = tiles.iter().map(|tile| tile.unsigned_area()).sum();
        assert!((total - expected).abs() < 1.0);
        // The strip merged into the tile left of the cut.
        let absorbed = tiles
            .iter()
            .find(|tile| (tile.unsigned_area() - 3000.05 * 1000.0).abs() < 1e-3);
        assert!(absorbed.is_some(), "merged tile not found");
    }

    #[test]
    fn overlap_buffer_grows_every_tile() {
        let input = rect(0.0, 0.0, 9000.0, 1000.0);
        let tiles = split_geometry(&multi(vec![input]), 1.0, 4000, 10.0).unwrap();
        assert_eq!(tiles.len(), 3);
        for tile in &tiles {
            assert!((tile.unsigned_area() - 3020.0 * 1020.0).abs() < 1e-3);
        }
    }

    #[test]
    fn rejects_self_intersecting_input() {
        let bowtie: Polygon<f64> = Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (10000.0, 10000.0),
                (10000.0, 0.0),
                (0.0, 10000.0),
                (0.0, 0.0),
            ]),
            vec![],
        );
        let result = split_geometry(&multi(vec![bowtie]), 1.0, 4000, 0.0);
        assert!(matches!(result, Err(GeomError::InvalidGeometry(_))));
    }

    #[test]
    fn rejects_bad_arguments() {
        let input = multi(vec![rect(0.0, 0.0, 100.0, 100.0)]);
        assert!(matches!(
            split_geometry(&input, 0.0, 4000, 0.0),
            Err(GeomError::InvalidArgument(_))
        ));
        assert!(matches!(
            split_geometry(&input, 1.0, 0, 0.0),
            Err(GeomError::InvalidArgument(_))
        ));
        assert!(matches!(
            split_geometry(&input, 1.0, 4000, -1.0),
            Err(GeomError::InvalidArgument(_))
        ));
        assert!(matches!(
            split_geometry(&MultiPolygon::new(vec![]), 1.0, 4000, 0.0),
            Err(GeomError::InvalidGeometry(_))
        ));
    }
}
