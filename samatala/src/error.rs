//! Error types for Samatala

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Samatala error type
#[derive(Error, Debug)]
pub enum Error {
    /// Artifact missing, unreadable, or not decodable
    #[error("Storage error at {}: {reason}", path.display())]
    Storage { path: PathBuf, reason: String },

    /// Bounded wait for an artifact exceeded
    #[error(
        "Timed out after {:.1}s waiting for {matcher} in {}",
        elapsed.as_secs_f64(),
        directory.display()
    )]
    ArtifactTimeout {
        elapsed: Duration,
        directory: PathBuf,
        matcher: String,
    },

    /// Region of interest contained no valid point
    #[error("No points left after filtering {total} points to the region of interest")]
    EmptyFilterResult { total: usize },

    /// Point cloud text could not be parsed into numeric rows
    #[error("Malformed point cloud (line {line}): {reason}")]
    MalformedInput { line: usize, reason: String },

    /// Optimizer did not converge or returned a result of the wrong shape
    #[error("Optimization diverged: {0}")]
    OptimizationDivergence(String),

    /// Simulator could not be launched or exited with failure
    #[error("Simulation failed (exit code {code:?}): {reason}")]
    SimulationFailed { code: Option<i32>, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested while blocking
    #[error("Cancelled while {0}")]
    Cancelled(String),

    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(line: usize, reason: impl ToString) -> Self {
        Error::MalformedInput {
            line,
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
