//! File-based handoff with external processes.
//!
//! The simulator runs outside this process and signals completion only by
//! writing files. [`FileWatcher`] polls a directory until a file accepted by an
//! [`ArtifactMatcher`] appears or the [`WaitPolicy`] timeout passes.
//!
//! Time is injected through [`Clock`] so waits can be driven by
//! [`ManualClock`] in tests.

pub mod clock;
pub mod matcher;
pub mod watcher;

pub use clock::{Clock, ManualClock, SystemClock};
pub use matcher::{ArtifactMatcher, PrefixSuffixMatcher};
pub use watcher::{FileWatcher, WaitPolicy};
