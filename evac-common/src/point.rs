//! Quantized planar coordinates and vertex UID derivation
//!
//! Coordinates are stored as integers scaled by [`POINT_RESOLUTION`], so two
//! points compare and hash equal exactly when they round to the same grid
//! position. Vertex identity is derived from that integer position.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Scale factor between floating coordinates and stored integers (1e-6 units)
pub const POINT_RESOLUTION: f64 = 1_000_000.0;

/// Stable integer identity of a graph vertex
pub type Uid = i64;

/// Largest coordinate magnitude that quantizes without saturating
pub const MAX_COORDINATE: f64 = 9.0e12;

#[inline]
fn quantize(value: f64) -> i64 {
    (value * POINT_RESOLUTION).round() as i64
}

/// A 2D coordinate with exact equality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    x: i64,
    y: i64,
}

impl Point {
    /// Quantize `(x, y)`; out of range values saturate, see [`Point::try_new`]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: quantize(x),
            y: quantize(y),
        }
    }

    /// Quantize `(x, y)`, rejecting NaN, infinities and magnitudes above [`MAX_COORDINATE`]
    pub fn try_new(x: f64, y: f64) -> Result<Self> {
        let representable = |v: f64| v.is_finite() && v.abs() <= MAX_COORDINATE;
        if representable(x) && representable(y) {
            Ok(Self::new(x, y))
        } else {
            Err(Error::InvalidCoordinate { x, y })
        }
    }

    /// False for points whose coordinates saturated on quantization
    pub fn is_in_range(&self) -> bool {
        let max = quantize(MAX_COORDINATE).unsigned_abs();
        self.x.unsigned_abs() <= max && self.y.unsigned_abs() <= max
    }

    /// Build from already quantized integer coordinates
    pub const fn from_raw(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.x as f64 / POINT_RESOLUTION
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.y as f64 / POINT_RESOLUTION
    }

    #[inline]
    pub fn raw(&self) -> (i64, i64) {
        (self.x, self.y)
    }

    /// Planar distance in coordinate units
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x() - other.x()).hypot(self.y() - other.y())
    }
}

impl TryFrom<[f64; 2]> for Point {
    type Error = Error;

    fn try_from(c: [f64; 2]) -> Result<Self> {
        Point::try_new(c[0], c[1])
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x(), p.y()]
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x(), self.y())
    }
}

/// Linearization of quantized coordinates into vertex UIDs
///
/// `uid = (x - x_min) + (y - y_min) * stride`, all in quantized units.
/// UIDs are collision-free for every point with `0 <= x - x_min < stride`
/// and `y >= y_min`. Points whose UID does not fit in an `i64` have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidGrid {
    x_min: i64,
    y_min: i64,
    stride: i64,
}

impl Default for UidGrid {
    /// Grid of the downtown Los Angeles evacuation dataset the router was first built for
    fn default() -> Self {
        UidGrid::new(-118.291729, 34.018017, 0.011979)
    }
}

impl UidGrid {
    /// Grid anchored at `(x_min, y_min)` covering `x_len` coordinate units horizontally
    pub fn new(x_min: f64, y_min: f64, x_len: f64) -> Self {
        Self {
            x_min: quantize(x_min),
            y_min: quantize(y_min),
            stride: quantize(x_len).max(0) + 1,
        }
    }

    /// Smallest grid covering every given point
    ///
    /// Returns the default grid when `points` is empty, and `GridOverflow`
    /// when the bounding box has more positions than an `i64` UID can number.
    pub fn covering<'a, I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut bounds: Option<(Point, Point)> = None;
        for p in points {
            bounds = Some(match bounds {
                None => (*p, *p),
                Some((lo, hi)) => (
                    Point::from_raw(lo.x.min(p.x), lo.y.min(p.y)),
                    Point::from_raw(hi.x.max(p.x), hi.y.max(p.y)),
                ),
            });
        }
        let Some((lo, hi)) = bounds else {
            return Ok(Self::default());
        };

        let stride = hi
            .x
            .checked_sub(lo.x)
            .and_then(|w| w.checked_add(1))
            .ok_or(Error::GridOverflow(hi))?;
        let grid = Self {
            x_min: lo.x,
            y_min: lo.y,
            stride,
        };
        // The far corner has the largest UID of the box
        grid.uid(&hi).ok_or(Error::GridOverflow(hi))?;
        Ok(grid)
    }

    /// UID of `p`, `None` when it does not fit in an `i64`
    #[inline]
    pub fn uid(&self, p: &Point) -> Option<Uid> {
        let hx = p.x.checked_sub(self.x_min)?;
        let hy = p.y.checked_sub(self.y_min)?;
        hy.checked_mul(self.stride)?.checked_add(hx)
    }

    /// Whether UIDs of `p` are guaranteed unique under this grid
    pub fn covers(&self, p: &Point) -> bool {
        match p.x.checked_sub(self.x_min) {
            Some(hx) => (0..self.stride).contains(&hx) && p.y >= self.y_min && self.uid(p).is_some(),
            None => false,
        }
    }

    /// Inverse of [`UidGrid::uid`] for covered points
    pub fn point_of(&self, uid: Uid) -> Point {
        Point::from_raw(
            uid.rem_euclid(self.stride) + self.x_min,
            uid.div_euclid(self.stride) + self.y_min,
        )
    }

    pub fn stride(&self) -> i64 {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantization_absorbs_float_noise() {
        let a = Point::new(0.1 + 0.2, 1.0);
        let b = Point::new(0.3, 1.0);
        assert_eq!(a, b);
        assert_eq!(a.raw(), (300_000, 1_000_000));
    }

    #[test]
    fn test_serde_as_coordinate_pair() {
        let p = Point::new(-118.25, 34.05);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[-118.25,34.05]");
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_uid_round_trips_inside_grid() {
        let grid = UidGrid::default();
        let p = Point::new(-118.285, 34.02);
        assert!(grid.covers(&p));
        assert_eq!(grid.point_of(grid.uid(&p).unwrap()), p);
    }

    #[test]
    fn test_covering_grid_is_collision_free() {
        let points: Vec<Point> = (0..20)
            .flat_map(|i| (0..20).map(move |j| Point::new(i as f64 * 0.5, j as f64 * 0.25)))
            .collect();
        let grid = UidGrid::covering(&points).unwrap();
        let mut uids: Vec<Uid> = points.iter().map(|p| grid.uid(p).unwrap()).collect();
        uids.sort_unstable();
        uids.dedup();
        assert_eq!(uids.len(), points.len());
        assert!(points.iter().all(|p| grid.covers(p)));
    }

    #[test]
    fn test_point_outside_grid_is_not_covered() {
        let grid = UidGrid::new(0.0, 0.0, 1.0);
        assert!(!grid.covers(&Point::new(2.0, 0.0)));
        assert!(!grid.covers(&Point::new(0.5, -1.0)));
        assert_eq!(grid.stride(), 1_000_001);
    }

    #[test]
    fn test_non_finite_coordinates_are_rejected() {
        assert!(matches!(Point::try_new(f64::NAN, 0.0), Err(Error::InvalidCoordinate { .. })));
        assert!(Point::try_new(0.0, f64::INFINITY).is_err());
        assert!(Point::try_new(1.0e15, 0.0).is_err());
        assert_eq!(Point::try_new(-118.25, 34.05).unwrap(), Point::new(-118.25, 34.05));

        assert!(serde_json::from_str::<Point>("[1e300, 0.0]").is_err());
        assert!(!Point::new(f64::INFINITY, 0.0).is_in_range());
        assert!(!Point::new(0.0, f64::NEG_INFINITY).is_in_range());
        assert!(Point::new(-118.25, 34.05).is_in_range());
    }

    #[test]
    fn test_uid_overflow_is_detected() {
        // Metre-scale coordinates: a 5 km square already exceeds i64 UIDs
        let points = [Point::new(0.0, 0.0), Point::new(5000.0, 5000.0)];
        assert!(matches!(UidGrid::covering(&points), Err(Error::GridOverflow(_))));

        let grid = UidGrid::new(0.0, 0.0, 5000.0);
        assert_eq!(grid.uid(&Point::new(5000.0, 5000.0)), None);
        assert!(!grid.covers(&Point::new(5000.0, 5000.0)));
        assert!(grid.uid(&Point::new(5000.0, 1.0)).is_some());
    }

    #[test]
    fn test_empty_covering_is_default_grid() {
        assert_eq!(UidGrid::covering(std::iter::empty()).unwrap(), UidGrid::default());
    }
}
