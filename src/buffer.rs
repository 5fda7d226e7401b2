use geo::algorithm::winding_order::Winding;
use geo_types::{Coord, LineString, Polygon};

use crate::error::{GeomError, Result};

/// Grows a polygon outward by `distance` georeferenced units with mitered
/// joins, so rectangular tiles keep sharp corners instead of rounded ones.
/// Holes shrink by the same distance. A distance of zero is the identity.
pub fn buffer_polygon(polygon: &Polygon<f64>, distance: f64) -> Result<Polygon<f64>> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(GeomError::InvalidArgument(format!(
            "buffer distance {distance} must be finite and non-negative"
        )));
    }
    if distance == 0.0 {
        return Ok(polygon.clone());
    }

    // With the exterior wound CCW and holes CW, the polygon exterior lies to
    // the right of travel on every ring, so one offset rule serves both.
    let mut exterior = polygon.exterior().clone();
    exterior.make_ccw_winding();
    let exterior = offset_ring(&exterior, distance)?;

    let mut interiors = Vec::with_capacity(polygon.interiors().len());
    for ring in polygon.interiors() {
        let mut ring = ring.clone();
        ring.make_cw_winding();
        interiors.push(offset_ring(&ring, distance)?);
    }

    Ok(Polygon::new(exterior, interiors))
}

/// Offsets every edge of a closed ring to the right of its direction of
/// travel, then rejoins consecutive edges at the intersection of their
/// supporting lines (the miter vertex).
fn offset_ring(ring: &LineString<f64>, distance: f64) -> Result<LineString<f64>> {
    let mut vertices: Vec<Coord<f64>> = ring.0.clone();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices.dedup();
    if vertices.len() < 3 {
        return Err(GeomError::InvalidGeometry(
            "cannot buffer a ring with fewer than 3 distinct vertices".to_string(),
        ));
    }

    let n = vertices.len();
    let mut offset_edges = Vec::with_capacity(n);
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            return Err(GeomError::InvalidGeometry(
                "ring contains a zero-length edge".to_string(),
            ));
        }
        // Unit normal to the right of travel.
        let nx = dy / length * distance;
        let ny = -dx / length * distance;
        offset_edges.push((
            Coord {
                x: a.x + nx,
                y: a.y + ny,
            },
            Coord {
                x: b.x + nx,
                y: b.y + ny,
            },
        ));
    }

    let mut out = Vec::with_capacity(n + 1);
    for i in 0..n {
        let previous = offset_edges[(i + n - 1) % n];
        let current = offset_edges[i];
        out.push(supporting_line_intersection(previous, current));
    }
    out.push(out[0]);

    Ok(LineString::new(out))
}

fn supporting_line_intersection(
    a: (Coord<f64>, Coord<f64>),
    b: (Coord<f64>, Coord<f64>),
) -> Coord<f64> {
    let d1 = Coord {
        x: a.1.x - a.0.x,
        y: a.1.y - a.0.y,
    };
    let d2 = Coord {
        x: b.1.x - b.0.x,
        y: b.1.y - b.0.y,
    };
    let cross = d1.x * d2.y - d1.y * d2.x;
    if cross.abs() < 1e-12 {
        // Collinear neighbors: the shared offset endpoint is the join.
        return a.1;
    }
    let t = ((b.0.x - a.0.x) * d2.y - (b.0.y - a.0.y) * d2.x) / cross;
    Coord {
        x: a.0.x + t * d1.x,
        y: a.0.y + t * d1.y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;
    use geo_types::LineString;

    fn square(size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (size, 0.0),
                (size, size),
                (0.0, size),
                (0.0, 0.0),
            ]),
            vec![],
        )
    }

    #[test]
    fn square_grows_with_sharp_corners() {
        let buffered = buffer_polygon(&square(10.0), 2.0).unwrap();
        assert!((buffered.unsigned_area() - 196.0).abs() < 1e-9);
        let has_corner = buffered
            .exterior()
            .coords()
            .any(|c| (c.x + 2.0).abs() < 1e-9 && (c.y + 2.0).abs() < 1e-9);
        assert!(has_corner, "mitered corner (-2, -2) missing");
    }

    #[test]
    fn zero_distance_is_identity() {
        let polygon = square(10.0);
        let buffered = buffer_polygon(&polygon, 0.0).unwrap();
        assert_eq!(buffered, polygon);
    }

    #[test]
    fn holes_shrink() {
        let polygon = Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (20.0, 0.0),
                (20.0, 20.0),
                (0.0, 20.0),
                (0.0, 0.0),
            ]),
            vec![LineString::from(vec![
                (8.0, 8.0),
                (12.0, 8.0),
                (12.0, 12.0),
                (8.0, 12.0),
                (8.0, 8.0),
            ])],
        );
        let buffered = buffer_polygon(&polygon, 1.0).unwrap();
        // Exterior 22x22, hole 2x2.
        assert!((buffered.unsigned_area() - (484.0 - 4.0)).abs() < 1e-9);
    }

    #[test]
    fn rejects_negative_distance() {
        assert!(buffer_polygon(&square(10.0), -1.0).is_err());
    }
}
