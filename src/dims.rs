use geo_types::{LineString, Polygon, Rect};

use crate::error::{GeomError, Result};

/// Axis-aligned rectangle in georeferenced units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl GeoBounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        for value in [min_x, min_y, max_x, max_y] {
            if !value.is_finite() {
                return Err(GeomError::InvalidArgument(
                    "bounds contain a non-finite coordinate".to_string(),
                ));
            }
        }
        if min_x > max_x || min_y > max_y {
            return Err(GeomError::InvalidArgument(format!(
                "malformed bounds ({min_x}, {min_y}, {max_x}, {max_y}): min exceeds max"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Bounds grown outward by the given per-axis distances.
    pub fn expanded(&self, y_pad: f64, x_pad: f64) -> Self {
        Self {
            min_x: self.min_x - x_pad,
            min_y: self.min_y - y_pad,
            max_x: self.max_x + x_pad,
            max_y: self.max_y + y_pad,
        }
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }
}

/// Minimum distance to pad each axis with, in georeferenced units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Padding {
    /// Same distance on both axes.
    Uniform(f64),
    /// Distinct distances, y-axis first.
    PerAxis { y: f64, x: f64 },
}

impl Padding {
    fn components(self) -> Result<(f64, f64)> {
        let (y, x) = match self {
            Padding::Uniform(value) => (value, value),
            Padding::PerAxis { y, x } => (y, x),
        };
        if !y.is_finite() || !x.is_finite() || y < 0.0 || x < 0.0 {
            return Err(GeomError::InvalidArgument(format!(
                "padding ({y}, {x}) must be finite and non-negative"
            )));
        }
        Ok((y, x))
    }
}

/// Resolves georeferenced bounds and a resolution into pixel dimensions.
///
/// The bounds are first grown by `padding`; if either resulting axis falls
/// short of `min_axis_pixels`, that axis alone is padded further by
/// `ceil(deficit / 2 * resolution)` and the dimensions re-derived, width
/// first. At most one correction per axis is ever needed, so the returned
/// width and height are both >= `min_axis_pixels`.
pub fn resolve_dims(
    bounds: GeoBounds,
    resolution: f64,
    padding: Option<Padding>,
    min_axis_pixels: u32,
) -> Result<(GeoBounds, u32, u32)> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(GeomError::InvalidArgument(format!(
            "resolution {resolution} must be a positive finite number"
        )));
    }
    if min_axis_pixels == 0 {
        return Err(GeomError::InvalidArgument(
            "min_axis_pixels must be at least 1".to_string(),
        ));
    }

    let (mut y_pad, mut x_pad) = padding.unwrap_or(Padding::Uniform(0.0)).components()?;
    let mut bounds = bounds;

    // Initial pass plus at most one correction per axis.
    for _ in 0..3 {
        bounds = bounds.expanded(y_pad, x_pad);
        let width = (bounds.width() / resolution).floor() as u32;
        let height = (bounds.height() / resolution).floor() as u32;
        if width < min_axis_pixels {
            x_pad = ((min_axis_pixels - width) as f64 / 2.0 * resolution).ceil();
            y_pad = 0.0;
            continue;
        }
        if height < min_axis_pixels {
            y_pad = ((min_axis_pixels - height) as f64 / 2.0 * resolution).ceil();
            x_pad = 0.0;
            continue;
        }
        return Ok((bounds, width, height));
    }

    Err(GeomError::OpFailure(
        "dimension padding did not converge".to_string(),
    ))
}
