//! Scoped process working-directory changes.
//!
//! The working directory is process-global. [`WorkingDirGuard`] holds a
//! process-wide lock for its whole lifetime, so concurrent runs never observe
//! each other's directory, and restores the previous directory on drop.
//!
//! Relative paths must not be resolved while another thread holds a guard;
//! [`absolute`] and [`resolve_command`] read the directory under the same lock.

use std::env;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};

static CWD_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Working directory held until drop.
pub struct WorkingDirGuard {
    previous: PathBuf,
    // Released after `drop` restores the directory
    _lock: MutexGuard<'static, ()>,
}

impl WorkingDirGuard {
    /// Lock the working directory and change into `dir`.
    pub fn enter(dir: &Path) -> Result<Self> {
        let lock = CWD_LOCK.lock();
        let previous = env::current_dir()?;
        env::set_current_dir(dir).map_err(|e| {
            Error::storage(dir, format!("Cannot enter working directory: {}", e))
        })?;
        log::debug!(
            "Working directory {} -> {}",
            previous.display(),
            dir.display()
        );
        Ok(Self {
            previous,
            _lock: lock,
        })
    }

    /// Directory restored on drop.
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

/// Caller's working directory, never a guard's.
pub fn current_dir() -> Result<PathBuf> {
    let _lock = CWD_LOCK.lock();
    Ok(env::current_dir()?)
}

/// Absolute form of `path` against the caller's working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let _lock = CWD_LOCK.lock();
    std::path::absolute(path)
        .map_err(|e| Error::storage(path, format!("Cannot resolve path: {}", e)))
}

/// Like [`absolute`], but bare names are left for `PATH` lookup.
pub fn resolve_command(command: &Path) -> Result<PathBuf> {
    if command.components().count() <= 1 {
        return Ok(command.to_path_buf());
    }
    absolute(command)
}

/// Hold the working-directory lock while asserting on the current directory.
#[cfg(test)]
pub(crate) fn lock_for_test() -> MutexGuard<'static, ()> {
    CWD_LOCK.lock()
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.previous) {
            log::error!(
                "Failed to restore working directory {}: {}",
                self.previous.display(),
                e
            );
        }
    }
}
