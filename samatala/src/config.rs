//! Configuration loading for Samatala
//!
//! Every section and field is optional; missing values fall back to the
//! reference pipeline settings.
//!
//! ```toml
//! [paths]
//! data_root = "data"
//!
//! [watch]
//! timeout_secs = 2000
//! poll_interval_secs = 5
//!
//! [simulator]
//! enabled = true
//! executable = "/opt/chrono/bin/demo_VEH_CRMTerrain_LevelValidation"
//! working_dir = "/opt/chrono/build"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::ArtifactLayout;
use crate::optimize::{DesiredConfig, OptimizerConfig, OptimizerProfile};
use crate::reduce::{Aggregation, ReducerConfig, RegionOfInterest};
use crate::sim::{SimulationRunner, VehiclePose, workdir};
use crate::watch::WaitPolicy;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "samatala.toml";

/// Main configuration structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub grid: GridConfig,
    pub desired: DesiredConfig,
    pub optimizer: OptimizerConfig,
    pub watch: WatchConfig,
    pub simulator: SimulatorConfig,
    pub logging: LoggingConfig,
}

/// Artifact locations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the artifact tree (default: "data")
    pub data_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
        }
    }
}

/// Height-map grid and region of interest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cells along x (default: 200)
    pub rows: usize,
    /// Cells along y (default: 100)
    pub cols: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// Ground plane; points at or below are dropped (default: 0.0)
    pub z_min: f64,
    pub aggregation: Aggregation,
}

impl Default for GridConfig {
    fn default() -> Self {
        let reducer = ReducerConfig::default();
        let region = RegionOfInterest::default();
        Self {
            rows: reducer.rows,
            cols: reducer.cols,
            x_min: region.x_min,
            x_max: region.x_max,
            y_min: region.y_min,
            y_max: region.y_max,
            z_min: region.z_min,
            aggregation: reducer.aggregation,
        }
    }
}

impl GridConfig {
    pub fn reducer(&self) -> ReducerConfig {
        ReducerConfig {
            rows: self.rows,
            cols: self.cols,
            aggregation: self.aggregation,
        }
    }

    pub fn region(&self) -> RegionOfInterest {
        RegionOfInterest {
            x_min: self.x_min,
            x_max: self.x_max,
            y_min: self.y_min,
            y_max: self.y_max,
            z_min: self.z_min,
        }
    }
}

/// Artifact polling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Give up waiting after this many seconds (default: 2000)
    pub timeout_secs: f64,
    /// Seconds between directory listings (default: 5)
    pub poll_interval_secs: f64,
    /// Seconds to wait after a match before reading (default: 2)
    pub settle_secs: f64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        let policy = WaitPolicy::default();
        Self {
            timeout_secs: policy.timeout.as_secs_f64(),
            poll_interval_secs: policy.poll_interval.as_secs_f64(),
            settle_secs: policy.settle_delay.as_secs_f64(),
        }
    }
}

impl WatchConfig {
    pub fn policy(&self) -> Result<WaitPolicy> {
        let secs = |name: &str, value: f64| {
            Duration::try_from_secs_f64(value)
                .map_err(|_| Error::Config(format!("watch.{} must be >= 0, got {}", name, value)))
        };
        Ok(WaitPolicy {
            timeout: secs("timeout_secs", self.timeout_secs)?,
            poll_interval: secs("poll_interval_secs", self.poll_interval_secs)?,
            settle_delay: secs("settle_secs", self.settle_secs)?,
        })
    }
}

/// External simulator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Launch the simulator from the pipeline (default: false, an operator runs it)
    pub enabled: bool,
    pub executable: PathBuf,
    /// Directory the simulator is started from
    pub working_dir: PathBuf,
    /// Initial pose `[x, y, z, qw, qx, qy, qz]`
    pub vehicle_init_state: Vec<f64>,
    /// Also simulate the second push once its commands are saved
    pub run_second_push: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            executable: PathBuf::from("demo_VEH_CRMTerrain_LevelValidation"),
            working_dir: PathBuf::from("."),
            vehicle_init_state: VehiclePose::default().to_vec(),
            run_second_push: false,
        }
    }
}

impl SimulatorConfig {
    pub fn runner(&self) -> Result<SimulationRunner> {
        Ok(SimulationRunner::new(
            &self.executable,
            &self.working_dir,
            VehiclePose::from_slice(&self.vehicle_init_state)?,
        ))
    }
}

/// Logger settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset (default: "info")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        let config: PipelineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `samatala.toml` when present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    /// Reject settings that would fail later in the run.
    pub fn validate(&self) -> Result<()> {
        if self.grid.rows == 0 || self.grid.cols == 0 {
            return Err(Error::Config(format!(
                "grid must be non-empty, got {}x{}",
                self.grid.rows, self.grid.cols
            )));
        }
        if !self.grid.region().is_valid() {
            return Err(Error::Config(format!(
                "grid bounds do not form a box: x [{}, {}], y [{}, {}]",
                self.grid.x_min, self.grid.x_max, self.grid.y_min, self.grid.y_max
            )));
        }
        self.watch.policy()?;
        self.profile().validate()?;
        VehiclePose::from_slice(&self.simulator.vehicle_init_state)?;
        Ok(())
    }

    /// Copy with every filesystem path made absolute against the current
    /// directory, so concurrent runs resolve the same files while a
    /// simulator holds the working directory.
    pub fn anchored(&self) -> Result<Self> {
        let mut config = self.clone();
        config.paths.data_root = workdir::absolute(&self.paths.data_root)?;
        config.simulator.working_dir = workdir::absolute(&self.simulator.working_dir)?;
        config.simulator.executable = workdir::resolve_command(&self.simulator.executable)?;
        if let Some(command) = &self.optimizer.command {
            config.optimizer.command = Some(workdir::resolve_command(command)?);
        }
        if let Some(model) = &self.optimizer.model_path {
            config.optimizer.model_path = Some(workdir::absolute(model)?);
        }
        Ok(config)
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.paths.data_root)
    }

    /// Optimizer profile shared by both pushes.
    pub fn profile(&self) -> OptimizerProfile {
        self.optimizer.profile(self.desired.case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::{DesiredCase, OptimizerBackend};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.paths.data_root, PathBuf::from("data"));
        assert_eq!(config.watch.policy().unwrap(), WaitPolicy::default());
        assert!(!config.simulator.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config: PipelineConfig = toml::from_str(include_str!("../samatala.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [paths]
            data_root = "/srv/leveling"

            [grid]
            aggregation = "mean"

            [desired]
            case = "flat"

            [optimizer]
            backend = "external"
            command = "python3"
            args = ["optimize.py"]
            num_iters = 10

            [watch]
            timeout_secs = 30
            poll_interval_secs = 0.5

            [simulator]
            enabled = true
            vehicle_init_state = [-1.0, 0.0, 0.3, 1.0, 0.0, 0.0, 0.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.data_root, PathBuf::from("/srv/leveling"));
        assert_eq!(config.grid.aggregation, Aggregation::Mean);
        assert_eq!(config.grid.rows, 200);
        assert_eq!(config.optimizer.backend, OptimizerBackend::External);
        assert_eq!(config.optimizer.learning_rate, 5e-4);
        assert_eq!(config.profile().case, DesiredCase::Flat);
        assert_eq!(config.profile().num_iters, 10);

        let policy = config.watch.policy().unwrap();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.poll_interval, Duration::from_millis(500));
        assert_eq!(policy.settle_delay, Duration::from_secs(2));

        assert!(config.simulator.enabled);
        let runner = config.simulator.runner().unwrap();
        assert_eq!(runner.working_dir(), Path::new("."));
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PipelineConfig::default();
        config.watch.poll_interval_secs = -1.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.grid.x_max = -1.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.simulator.vehicle_init_state = vec![0.0; 3];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_anchored_paths_are_absolute() {
        let mut config = PipelineConfig::default();
        config.simulator.executable = PathBuf::from("bin/demo");
        config.optimizer.command = Some(PathBuf::from("python3"));
        config.optimizer.model_path = Some(PathBuf::from("models/level.pt"));

        let cwd = workdir::current_dir().unwrap();
        let anchored = config.anchored().unwrap();
        assert_eq!(anchored.paths.data_root, cwd.join("data"));
        assert_eq!(anchored.simulator.working_dir, cwd);
        assert_eq!(anchored.simulator.executable, cwd.join("bin/demo"));
        assert_eq!(anchored.optimizer.command, Some(PathBuf::from("python3")));
        assert_eq!(
            anchored.optimizer.model_path,
            Some(cwd.join("models/level.pt"))
        );

        config.paths.data_root = PathBuf::from("/srv/leveling");
        let anchored = config.anchored().unwrap();
        assert_eq!(anchored.paths.data_root, PathBuf::from("/srv/leveling"));
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("samatala.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");

        fs::write(&path, "[watch\n").unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(Error::Config(_))));

        let missing = PipelineConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
