//! Control optimization.
//!
//! A [`ControlOptimizer`] turns an (initial, desired) height-map pair into the
//! blade [`ControlSequence`] expected to move the terrain toward the target.
//! Hyperparameters travel in an [`OptimizerProfile`] so both pushes of a run
//! are optimized identically.
//!
//! Two backends are available:
//!
//! - [`SurrogateOptimizer`]: in-process descent over a differentiable blade-cut model
//! - [`ExternalOptimizer`]: delegates to a configured command (e.g. a learned model)

pub mod desired;
pub mod external;
pub mod surrogate;

pub use desired::{DesiredCase, DesiredConfig, create_desired_heightmap};
pub use external::ExternalOptimizer;
pub use surrogate::SurrogateOptimizer;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{ControlSequence, DEFAULT_ACTUATORS, HeightMap};
use crate::error::{Error, Result};

/// Fixed hyperparameters of one optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerProfile {
    pub learning_rate: f64,
    pub num_iters: usize,
    /// Weight of the actuation (time) cost against terrain error
    pub time_weight: f64,
    /// Desired terrain case label
    pub case: DesiredCase,
    /// Scenario label forwarded to model-backed optimizers
    pub scenario: String,
    /// Seed for the initial guess
    pub seed: u64,
    /// Commands per sequence
    pub actuators: usize,
}

impl Default for OptimizerProfile {
    fn default() -> Self {
        Self {
            learning_rate: 5e-4,
            num_iters: 2000,
            time_weight: 1e-6,
            case: DesiredCase::Center,
            scenario: "init-mid".to_string(),
            seed: 0,
            actuators: DEFAULT_ACTUATORS,
        }
    }
}

impl OptimizerProfile {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.time_weight.is_finite() && self.time_weight >= 0.0) {
            return Err(Error::Config(format!(
                "time_weight must be non-negative, got {}",
                self.time_weight
            )));
        }
        if self.actuators == 0 {
            return Err(Error::Config("actuators must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Optimizes blade commands for a terrain transition.
pub trait ControlOptimizer: Send + Sync {
    /// Find commands that move `initial` toward `desired`.
    ///
    /// Deterministic for a given profile seed. Fails with
    /// [`Error::OptimizationDivergence`] on a non-finite loss or a result
    /// that is not `(profile.actuators, 2)`.
    fn optimize(
        &self,
        initial: &HeightMap,
        desired: &HeightMap,
        profile: &OptimizerProfile,
    ) -> Result<ControlSequence>;

    fn name(&self) -> &'static str;
}

/// Optimizer implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerBackend {
    #[default]
    Surrogate,
    External,
}

/// `[optimizer]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub backend: OptimizerBackend,
    /// Default: 5e-4
    pub learning_rate: f64,
    /// Default: 2000
    pub num_iters: usize,
    /// Default: 1e-6
    pub time_weight: f64,
    /// Default: "init-mid"
    pub scenario: String,
    pub seed: u64,
    /// Commands per sequence. Default: 2
    pub actuators: usize,
    /// Model file forwarded to the external optimizer
    pub model_path: Option<PathBuf>,
    /// External optimizer executable
    pub command: Option<PathBuf>,
    /// Extra leading arguments for the external optimizer
    pub args: Vec<String>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let profile = OptimizerProfile::default();
        Self {
            backend: OptimizerBackend::Surrogate,
            learning_rate: profile.learning_rate,
            num_iters: profile.num_iters,
            time_weight: profile.time_weight,
            scenario: profile.scenario,
            seed: profile.seed,
            actuators: profile.actuators,
            model_path: None,
            command: None,
            args: Vec::new(),
        }
    }
}

impl OptimizerConfig {
    /// Hyperparameter profile for a desired terrain case.
    pub fn profile(&self, case: DesiredCase) -> OptimizerProfile {
        OptimizerProfile {
            learning_rate: self.learning_rate,
            num_iters: self.num_iters,
            time_weight: self.time_weight,
            case,
            scenario: self.scenario.clone(),
            seed: self.seed,
            actuators: self.actuators,
        }
    }
}

/// Instantiate the configured backend.
pub fn create_optimizer(config: &OptimizerConfig) -> Result<Box<dyn ControlOptimizer>> {
    match config.backend {
        OptimizerBackend::Surrogate => Ok(Box::new(SurrogateOptimizer::new())),
        OptimizerBackend::External => {
            let Some(command) = &config.command else {
                return Err(Error::Config(
                    "optimizer.command is required for the external backend".to_string(),
                ));
            };
            // Leading args may name scripts relative to the launch directory
            let mut optimizer = ExternalOptimizer::new(command)
                .with_args(config.args.clone())
                .with_working_dir(crate::sim::workdir::current_dir()?);
            if let Some(model) = &config.model_path {
                optimizer = optimizer.with_model(model);
            }
            Ok(Box::new(optimizer))
        }
    }
}

/// Shared input checks for optimizer implementations.
pub(crate) fn check_inputs(
    initial: &HeightMap,
    desired: &HeightMap,
    profile: &OptimizerProfile,
) -> Result<()> {
    profile.validate()?;
    if initial.shape() != desired.shape() {
        return Err(Error::OptimizationDivergence(format!(
            "initial map {:?} and desired map {:?} differ in shape",
            initial.shape(),
            desired.shape()
        )));
    }
    if initial.is_empty() {
        return Err(Error::OptimizationDivergence(
            "cannot optimize over an empty height map".to_string(),
        ));
    }
    if !initial.is_finite() || !desired.is_finite() {
        return Err(Error::OptimizationDivergence(
            "height maps contain non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Shape check applied to every optimizer result.
pub(crate) fn check_output(sequence: ControlSequence, profile: &OptimizerProfile) -> Result<ControlSequence> {
    if sequence.shape() != (profile.actuators, 2) {
        return Err(Error::OptimizationDivergence(format!(
            "expected control shape ({}, 2), got {:?}",
            profile.actuators,
            sequence.shape()
        )));
    }
    Ok(sequence)
}
