//! # Samatala
//!
//! Plan, simulate and re-plan orchestration for autonomous soil leveling.
//!
//! ## Overview
//!
//! A run levels one soil pile in two blade pushes:
//!
//! 1. Optimize first-push blade commands from the initial height map
//! 2. Hand the commands to an external terrain simulator (files only)
//! 3. Wait for the simulator's particle cloud and reduce it to a height map
//! 4. Optimize second-push commands from that intermediate terrain
//!
//! Every artifact path is derived from a [`RunIdentity`] (pile height, push
//! label), so runs for different piles never touch the same files.
//!
//! ## Modules
//!
//! - **core**: height maps, control sequences, run identities
//! - **io**: artifact layout, `.npy` height maps, atomic writes
//! - **reduce**: point-cloud parsing, region filtering, rasterization
//! - **watch**: bounded polling for externally produced files
//! - **sim**: simulator invocation with a scoped working directory
//! - **optimize**: desired terrain and control optimizer backends
//! - **pipeline**: the run state machine
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use samatala::{PileHeight, PipelineConfig, PipelineDriver};
//!
//! let config = PipelineConfig::load_or_default(None)?;
//! let driver = PipelineDriver::from_config(&config, None)?;
//! let report = driver.run(PileHeight::new(0.37)?)?;
//! println!("{} ended in {}", report.identity, report.state.name());
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod optimize;
pub mod pipeline;
pub mod reduce;
pub mod sim;
pub mod utils;
pub mod watch;

pub use config::PipelineConfig;
pub use core::{ControlCommand, ControlSequence, HeightMap, PileHeight, PushSequence, RunIdentity};
pub use error::{Error, Result};
pub use io::{ArtifactLayout, HeightmapStore};
pub use optimize::{ControlOptimizer, OptimizerProfile};
pub use pipeline::{PipelineDriver, PipelineReport, PipelineState};
pub use reduce::{PointCloud, PointCloudReducer, RegionOfInterest};
pub use sim::SimulationRunner;
pub use watch::{FileWatcher, WaitPolicy};
