//! Point-cloud to height-map reduction.
//!
//! The simulator reports the soil as a particle cloud. The reducer keeps the
//! particles inside the [`RegionOfInterest`] and rasterizes them onto the fixed
//! height-map grid spanning that region:
//!
//! - rows run along x (push direction), columns along y
//! - cell index is `floor((v - min) / (max - min) * n)`, clamped to `n - 1`
//! - cells receive the max (default) or mean elevation of their points
//! - cells without points are 0.0
//!
//! An empty filter result is an error rather than a flat map, since a flat map
//! would silently tell the optimizer that the pile vanished.

pub mod point_cloud;
pub mod region;

pub use point_cloud::{Point3, PointCloud};
pub use region::RegionOfInterest;

use serde::{Deserialize, Serialize};

use crate::core::{DEFAULT_COLS, DEFAULT_ROWS, HeightMap};
use crate::error::{Error, Result};

/// Per-cell aggregation of point elevations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Highest point in the cell (pile surface)
    #[default]
    Max,
    /// Mean elevation of the cell's points
    Mean,
}

/// Grid shape and aggregation used for rasterization.
#[derive(Debug, Clone, Copy)]
pub struct ReducerConfig {
    /// Cells along x. Default: 200
    pub rows: usize,
    /// Cells along y. Default: 100
    pub cols: usize,
    pub aggregation: Aggregation,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            aggregation: Aggregation::Max,
        }
    }
}

/// Filters raw clouds and reduces them to height maps.
#[derive(Debug, Clone)]
pub struct PointCloudReducer {
    config: ReducerConfig,
}

impl PointCloudReducer {
    pub fn new(config: ReducerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    /// Filter `cloud` to `region` and rasterize the survivors.
    pub fn reduce(&self, cloud: &PointCloud, region: &RegionOfInterest) -> Result<HeightMap> {
        let ReducerConfig {
            rows,
            cols,
            aggregation,
        } = self.config;
        if rows == 0 || cols == 0 {
            return Err(Error::Config(format!(
                "height map grid must be non-empty, got {}x{}",
                rows, cols
            )));
        }
        if !region.is_valid() {
            return Err(Error::Config(format!(
                "invalid region of interest: {:?}",
                region
            )));
        }

        let kept = region.apply(cloud.points());
        log::info!(
            "Points after filter: {} of {} ({:.1}%)",
            kept.len(),
            cloud.len(),
            if cloud.is_empty() {
                0.0
            } else {
                kept.len() as f64 * 100.0 / cloud.len() as f64
            }
        );
        if kept.is_empty() {
            return Err(Error::EmptyFilterResult { total: cloud.len() });
        }

        // Coordinates stay f64 until a cell value is written
        let bin = |v: f64, min: f64, width: f64, n: usize| {
            (((v - min) / width * n as f64).floor() as usize).min(n - 1)
        };
        let cell = |p: &Point3| {
            bin(p.x, region.x_min, region.width_x(), rows) * cols
                + bin(p.y, region.y_min, region.width_y(), cols)
        };

        let map = match aggregation {
            Aggregation::Max => {
                let mut cells = vec![f64::NEG_INFINITY; rows * cols];
                for p in &kept {
                    let idx = cell(p);
                    cells[idx] = cells[idx].max(p.z);
                }
                cells
                    .into_iter()
                    .map(|v| if v == f64::NEG_INFINITY { 0.0 } else { v as f32 })
                    .collect()
            }
            Aggregation::Mean => {
                let mut sums = vec![0.0f64; rows * cols];
                let mut counts = vec![0u32; rows * cols];
                for p in &kept {
                    let idx = cell(p);
                    sums[idx] += p.z;
                    counts[idx] += 1;
                }
                sums.iter()
                    .zip(&counts)
                    .map(|(&s, &n)| if n == 0 { 0.0 } else { (s / n as f64) as f32 })
                    .collect()
            }
        };

        HeightMap::from_vec(rows, cols, map)
            .ok_or_else(|| Error::Config("height map shape mismatch".to_string()))
    }
}

impl Default for PointCloudReducer {
    fn default() -> Self {
        Self::new(ReducerConfig::default())
    }
}
