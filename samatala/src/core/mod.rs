//! Core data types shared by every stage.

pub mod control;
pub mod heightmap;
pub mod identity;

pub use control::{ControlCommand, ControlSequence, DEFAULT_ACTUATORS};
pub use heightmap::{DEFAULT_COLS, DEFAULT_ROWS, HeightMap};
pub use identity::{PileHeight, PushSequence, RunIdentity};
