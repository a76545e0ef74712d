//! Run orchestration.
//!
//! One run per pile height:
//!
//! ```text
//! Init -> Opt1Done -> [Simulating] -> WaitArtifact -> Reduced -> Opt2Done -> Done
//!                              any non-terminal state -> Failed
//! ```

pub mod driver;
pub mod state;

pub use driver::{PipelineDriver, PipelineReport};
pub use state::PipelineState;
