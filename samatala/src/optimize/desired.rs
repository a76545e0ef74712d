//! Target terrain generation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::HeightMap;
use crate::error::{Error, Result};

/// Shape of the target terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredCase {
    /// Raised level pad in the middle of the work area
    #[default]
    Center,
    /// Everything scraped to ground level
    Flat,
}

impl DesiredCase {
    pub fn name(&self) -> &'static str {
        match self {
            DesiredCase::Center => "center",
            DesiredCase::Flat => "flat",
        }
    }
}

impl fmt::Display for DesiredCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Desired terrain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredConfig {
    pub case: DesiredCase,
    /// Pad height in meters. Default: 0.1
    pub level: f32,
    /// Fraction of each axis left at zero on either side of the pad. Default: 0.25
    pub border_fraction: f32,
}

impl Default for DesiredConfig {
    fn default() -> Self {
        Self {
            case: DesiredCase::Center,
            level: 0.1,
            border_fraction: 0.25,
        }
    }
}

/// Build the target height map for `config` on a `rows x cols` grid.
pub fn create_desired_heightmap(config: &DesiredConfig, rows: usize, cols: usize) -> Result<HeightMap> {
    if !config.level.is_finite() {
        return Err(Error::Config(format!(
            "desired level must be finite, got {}",
            config.level
        )));
    }
    if !(0.0..0.5).contains(&config.border_fraction) {
        return Err(Error::Config(format!(
            "border_fraction must be in [0, 0.5), got {}",
            config.border_fraction
        )));
    }

    let map = match config.case {
        DesiredCase::Flat => HeightMap::zeros(rows, cols),
        DesiredCase::Center => {
            let span = |n: usize| {
                let lo = (n as f32 * config.border_fraction).floor() as usize;
                (lo, n - lo)
            };
            let (r0, r1) = span(rows);
            let (c0, c1) = span(cols);
            HeightMap::from_fn(rows, cols, |r, c| {
                if (r0..r1).contains(&r) && (c0..c1).contains(&c) {
                    config.level
                } else {
                    0.0
                }
            })
        }
    };
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_pad() {
        let map = create_desired_heightmap(&DesiredConfig::default(), 200, 100).unwrap();
        assert_eq!(map.shape(), (200, 100));
        assert_eq!(map.get(0, 0), Some(0.0));
        assert_eq!(map.get(49, 50), Some(0.0));
        assert_eq!(map.get(50, 25), Some(0.1));
        assert_eq!(map.get(149, 74), Some(0.1));
        assert_eq!(map.get(150, 74), Some(0.0));
        assert_eq!(map.occupied_cells(), 100 * 50);
    }

    #[test]
    fn test_flat() {
        let config = DesiredConfig {
            case: DesiredCase::Flat,
            ..Default::default()
        };
        let map = create_desired_heightmap(&config, 20, 10).unwrap();
        assert_eq!(map.occupied_cells(), 0);
    }

    #[test]
    fn test_invalid_border() {
        let config = DesiredConfig {
            border_fraction: 0.5,
            ..Default::default()
        };
        assert!(create_desired_heightmap(&config, 20, 10).is_err());
    }

    #[test]
    fn test_case_from_toml() {
        let config: DesiredConfig = toml::from_str("case = \"flat\"").unwrap();
        assert_eq!(config.case, DesiredCase::Flat);
        assert_eq!(config.level, 0.1);
    }
}
