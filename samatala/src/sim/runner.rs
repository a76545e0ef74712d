//! External simulator invocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::str::FromStr;

use super::workdir::{WorkingDirGuard, resolve_command};
use crate::core::RunIdentity;
use crate::error::{Error, Result};

/// Initial vehicle pose passed to the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehiclePose {
    /// Position (x, y, z) in meters
    pub position: [f64; 3],
    /// Orientation quaternion (w, x, y, z)
    pub orientation: [f64; 4],
}

impl VehiclePose {
    /// Build from the flat `[x, y, z, qw, qx, qy, qz]` form.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let [x, y, z, qw, qx, qy, qz] = values else {
            return Err(Error::Config(format!(
                "vehicle pose needs 7 values (x, y, z, qw, qx, qy, qz), got {}",
                values.len()
            )));
        };
        let pose = Self {
            position: [*x, *y, *z],
            orientation: [*qw, *qx, *qy, *qz],
        };
        if !pose.to_vec().iter().all(|v| v.is_finite()) {
            return Err(Error::Config("vehicle pose must be finite".to_string()));
        }
        Ok(pose)
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.position
            .iter()
            .chain(self.orientation.iter())
            .copied()
            .collect()
    }

    /// Comma-joined argument form, e.g. `-2.0,0.0,0.3,1.0,0.0,0.0,0.0`.
    pub fn to_arg(&self) -> String {
        self.to_vec()
            .iter()
            .map(|v| format!("{:?}", v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for VehiclePose {
    fn default() -> Self {
        Self {
            position: [-2.0, 0.0, 0.3],
            orientation: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

impl fmt::Display for VehiclePose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_arg())
    }
}

impl FromStr for VehiclePose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("invalid vehicle pose {:?}: {}", s, e)))?;
        Self::from_slice(&values)
    }
}

/// Launches the simulator for one run identity.
///
/// Completion of the process says nothing about its output files; callers
/// wait for those separately.
#[derive(Debug, Clone)]
pub struct SimulationRunner {
    executable: PathBuf,
    working_dir: PathBuf,
    vehicle_init_state: VehiclePose,
}

impl SimulationRunner {
    pub fn new(
        executable: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        vehicle_init_state: VehiclePose,
    ) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
            vehicle_init_state,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Arguments for one invocation.
    pub fn command_args(&self, id: &RunIdentity) -> Vec<String> {
        vec![
            "--pile_height".to_string(),
            id.pile_height.repr(),
            "--push_seq".to_string(),
            id.push.to_string(),
            "--veh_init_state".to_string(),
            self.vehicle_init_state.to_arg(),
        ]
    }

    /// Run the simulator to completion from its working directory.
    pub fn run(&self, id: &RunIdentity) -> Result<ExitStatus> {
        // Resolve against the caller's directory before switching away from it
        let executable =
            resolve_command(&self.executable).map_err(|e| Error::SimulationFailed {
                code: None,
                reason: e.to_string(),
            })?;
        let args = self.command_args(id);

        log::info!(
            "[{}] Running simulator: {} {} (in {})",
            id,
            executable.display(),
            args.join(" "),
            self.working_dir.display()
        );

        let status = {
            let _cwd = WorkingDirGuard::enter(&self.working_dir).map_err(|e| {
                Error::SimulationFailed {
                    code: None,
                    reason: e.to_string(),
                }
            })?;
            Command::new(&executable)
                .args(&args)
                .status()
                .map_err(|e| Error::SimulationFailed {
                    code: None,
                    reason: format!("failed to launch {}: {}", executable.display(), e),
                })?
        };

        if !status.success() {
            return Err(Error::SimulationFailed {
                code: status.code(),
                reason: format!("{} exited with {}", executable.display(), status),
            });
        }
        log::info!("[{}] Simulator finished", id);
        Ok(status)
    }
}
