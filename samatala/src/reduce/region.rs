//! Region-of-interest gating for simulator point clouds.
//!
//! Keeps points inside the vehicle's sensed working area and above the ground
//! plane. All bounds are strict: a point lying exactly on a bound is rejected.

use serde::{Deserialize, Serialize};

use super::point_cloud::Point3;

/// Axis-aligned box a point must lie strictly inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOfInterest {
    /// Lower x bound (exclusive). Default: 0.0
    pub x_min: f64,
    /// Upper x bound (exclusive). Default: 5.0
    pub x_max: f64,
    /// Lower y bound (exclusive). Default: -1.0
    pub y_min: f64,
    /// Upper y bound (exclusive). Default: 1.0
    pub y_max: f64,
    /// Ground plane; points must be strictly above it. Default: 0.0
    pub z_min: f64,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 5.0,
            y_min: -1.0,
            y_max: 1.0,
            z_min: 0.0,
        }
    }
}

impl RegionOfInterest {
    /// Check if a point survives the filter.
    #[inline]
    pub fn contains(&self, p: &Point3) -> bool {
        p.z > self.z_min
            && p.x > self.x_min
            && p.x < self.x_max
            && p.y > self.y_min
            && p.y < self.y_max
    }

    /// Bounds describe a non-empty planar box.
    pub fn is_valid(&self) -> bool {
        [self.x_min, self.x_max, self.y_min, self.y_max, self.z_min]
            .iter()
            .all(|v| v.is_finite())
            && self.x_min < self.x_max
            && self.y_min < self.y_max
    }

    pub fn width_x(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn width_y(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Points that survive the filter, in input order.
    pub fn apply(&self, points: &[Point3]) -> Vec<Point3> {
        points.iter().copied().filter(|p| self.contains(p)).collect()
    }
}
