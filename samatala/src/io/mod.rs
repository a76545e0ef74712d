//! Artifact persistence.
//!
//! This module provides:
//!
//! - **Layout**: deterministic artifact paths derived from a run identity
//! - **Height maps**: `.npy` encoding and the atomic-write [`HeightmapStore`]
//! - **Control commands**: the text artifact handed to the simulator
//!
//! ## Saving and Loading Height Maps
//!
//! ```rust,ignore
//! use samatala::io::{ArtifactLayout, HeightmapStore, STAGE_HEIGHTMAP};
//!
//! let store = HeightmapStore::new(ArtifactLayout::new("data"));
//! let path = store.path_for(&identity, STAGE_HEIGHTMAP);
//! store.save(&path, &map)?;
//! let loaded = store.load(&path)?;
//! ```

pub mod commands;
pub mod layout;
pub mod npy;
pub mod store;

pub use commands::{load_control_sequence, save_control_sequence};
pub use layout::{ArtifactLayout, POINT_CLOUD_PREFIX, POINT_CLOUD_SUFFIX, STAGE_HEIGHTMAP};
pub use npy::{NpyError, encode_npy, read_npy, write_npy};
pub use store::{HeightmapStore, write_atomic};
