//! Signal handling utilities for graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;

/// Set up a Ctrl-C handler that sets the returned flag to false.
///
/// Artifact waits observing the flag return `Error::Cancelled`; a running
/// simulator process is left alone.
///
/// # Example
/// ```ignore
/// let running = setup_ctrl_c_handler()?;
/// let driver = PipelineDriver::from_config(&config, Some(running))?;
/// ```
pub fn setup_ctrl_c_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::warn!("Shutdown requested");
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}
