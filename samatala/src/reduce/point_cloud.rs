//! Raw simulator point clouds.
//!
//! The simulator writes comma-delimited text: one header row followed by rows
//! of at least three numeric columns (x, y, z, then extra per-particle fields).
//! Only the position columns are kept.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Minimum columns per row (x, y, z).
const MIN_COLUMNS: usize = 3;

/// A 3-D point in the simulator frame (meters).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Unordered point set read from one simulator artifact.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    points: Vec<Point3>,
    columns: usize,
}

impl PointCloud {
    pub fn from_points(points: Vec<Point3>) -> Self {
        Self {
            points,
            columns: MIN_COLUMNS,
        }
    }

    /// Read and parse a point-cloud file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::storage(path, format!("Failed to read point cloud: {}", e)))?;
        let cloud = Self::parse(&text)?;
        log::debug!(
            "Parsed {} points ({} columns) from {}",
            cloud.len(),
            cloud.columns,
            path.display()
        );
        Ok(cloud)
    }

    /// Parse delimited text with one header row.
    ///
    /// Every row must have the header's column count. A single trailing
    /// delimiter is tolerated on any line; blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let Some((_, header)) = lines.next() else {
            return Err(Error::malformed(0, "missing header row"));
        };
        let columns = split_fields(header).count();
        if columns < MIN_COLUMNS {
            return Err(Error::malformed(
                1,
                format!(
                    "header has {} columns, need at least {}",
                    columns, MIN_COLUMNS
                ),
            ));
        }

        let mut points = Vec::new();
        for (line_no, line) in lines {
            let mut xyz = [0.0f64; MIN_COLUMNS];
            let mut count = 0;
            for field in split_fields(line) {
                let value: f64 = field.parse().map_err(|_| {
                    Error::malformed(line_no, format!("non-numeric field {:?}", field))
                })?;
                if count < MIN_COLUMNS {
                    xyz[count] = value;
                }
                count += 1;
            }
            if count != columns {
                return Err(Error::malformed(
                    line_no,
                    format!("expected {} columns, found {}", columns, count),
                ));
            }
            points.push(Point3::new(xyz[0], xyz[1], xyz[2]));
        }

        Ok(Self { points, columns })
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Columns per row in the source file.
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    line.strip_suffix(',').unwrap_or(line).split(',').map(str::trim)
}
