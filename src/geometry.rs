//! Planar geometry helpers used by clustering and smoothing.
//!
//! All angles are in degrees. Screen coordinates grow right (+x) and down
//! (+y), so a bearing of 0° points right and 90° points down.

use serde::{Deserialize, Serialize};

/// A point in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Bearing from `self` towards `other`, in degrees within (-180, 180]
    pub fn bearing_to(&self, other: &Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x).to_degrees()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Arithmetic mean of a set of points. `None` for an empty set.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Linear interpolation from `start` towards `end`
pub fn lerp(start: f64, end: f64, factor: f64) -> f64 {
    start + (end - start) * factor
}

/// Signed difference `to - from` folded onto the short way round, in [-180, 180)
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

/// Angular interpolation along the shortest arc.
///
/// The result is not re-wrapped, so it may leave [-180, 180); use
/// [`normalize_angle`] before storing it.
pub fn lerp_angle(start: f64, end: f64, factor: f64) -> f64 {
    start + shortest_angle_delta(start, end) * factor
}

/// Fold any angle into [-180, 180)
pub fn normalize_angle(angle: f64) -> f64 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}
