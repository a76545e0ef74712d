//! Simulator process management.

pub mod runner;
pub mod workdir;

pub use runner::{SimulationRunner, VehiclePose};
pub use workdir::WorkingDirGuard;
