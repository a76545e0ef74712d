//! Pipeline state machine states.

use std::path::PathBuf;

/// Progress of one pile's plan, simulate, re-plan run
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineState {
    /// Nothing done yet
    Init,

    /// First-push commands persisted
    Opt1Done {
        /// Control-command artifact
        commands: PathBuf,
    },

    /// Simulator running for the first push
    Simulating,

    /// Polling for the simulator's point cloud
    WaitArtifact {
        /// Directory being polled
        directory: PathBuf,
    },

    /// Point cloud reduced and the intermediate height map persisted
    Reduced {
        /// Height-map artifact
        heightmap: PathBuf,
    },

    /// Second-push commands persisted
    Opt2Done {
        /// Control-command artifact
        commands: PathBuf,
    },

    /// All stages complete
    Done,

    /// Stopped by an error
    Failed {
        /// Reason for failure
        reason: String,
    },
}

impl PipelineState {
    /// Is this a terminal state?
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }

    /// State name for logging
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Init => "Init",
            PipelineState::Opt1Done { .. } => "Opt1Done",
            PipelineState::Simulating => "Simulating",
            PipelineState::WaitArtifact { .. } => "WaitArtifact",
            PipelineState::Reduced { .. } => "Reduced",
            PipelineState::Opt2Done { .. } => "Opt2Done",
            PipelineState::Done => "Done",
            PipelineState::Failed { .. } => "Failed",
        }
    }

    /// Position along the happy path; `Failed` has none.
    fn rank(&self) -> Option<u8> {
        match self {
            PipelineState::Init => Some(0),
            PipelineState::Opt1Done { .. } => Some(1),
            PipelineState::Simulating => Some(2),
            PipelineState::WaitArtifact { .. } => Some(3),
            PipelineState::Reduced { .. } => Some(4),
            PipelineState::Opt2Done { .. } => Some(5),
            PipelineState::Done => Some(6),
            PipelineState::Failed { .. } => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Stages only move forward (simulation may be skipped) and `Failed` is
    /// reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, PipelineState::Failed { .. }) => true,
            (PipelineState::Opt1Done { .. }, PipelineState::WaitArtifact { .. }) => true,
            (from, to) => matches!((from.rank(), to.rank()), (Some(a), Some(b)) if b == a + 1),
        }
    }
}
