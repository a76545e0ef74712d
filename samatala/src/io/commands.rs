//! Control-command artifacts consumed by the simulator.

use std::fs;
use std::path::Path;

use crate::core::ControlSequence;
use crate::error::{Error, Result};

use super::store::write_atomic;

/// Save control commands as `"<pitch>,<vertical>\n"` lines.
pub fn save_control_sequence(path: &Path, sequence: &ControlSequence) -> Result<()> {
    write_atomic(path, sequence.to_text().as_bytes())?;
    log::info!("Saved control commands to {}", path.display());
    Ok(())
}

/// Load a control-command artifact.
pub fn load_control_sequence(path: &Path) -> Result<ControlSequence> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::storage(path, format!("Failed to read: {}", e)))?;
    ControlSequence::parse(&text).map_err(|reason| Error::storage(path, reason))
}
