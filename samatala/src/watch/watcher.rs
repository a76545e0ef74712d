//! Bounded polling for artifacts produced by an external process.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::clock::{Clock, SystemClock};
use super::matcher::ArtifactMatcher;
use crate::error::{Error, Result};

/// Smallest poll interval honored; protects against busy loops.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest uninterrupted sleep when a shutdown flag is attached.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing of info-level "still waiting" lines.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Timing of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    /// Give up once this much time has passed. Default: 2000s
    pub timeout: Duration,
    /// Delay between directory listings. Default: 5s
    pub poll_interval: Duration,
    /// Pause after a match so the producer can finish writing. Default: 2s
    pub settle_delay: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2000),
            poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Waits for files matching a predicate to appear in a directory.
///
/// Directories are listed, never watched through OS notifications, so the
/// producer may be any process on a shared filesystem.
#[derive(Clone)]
pub struct FileWatcher {
    clock: Arc<dyn Clock>,
    running: Option<Arc<AtomicBool>>,
}

impl FileWatcher {
    /// Watcher on wall-clock time.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            running: None,
        }
    }

    /// Abort waits with [`Error::Cancelled`] once `running` goes false.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    /// Block until a matching file exists in `directory`, then return its path.
    ///
    /// A missing directory counts as empty. When several files match, the
    /// lexicographically first one is returned. After a match the watcher
    /// sleeps for the settle delay before returning.
    pub fn await_artifact(
        &self,
        matcher: &dyn ArtifactMatcher,
        directory: &Path,
        policy: &WaitPolicy,
    ) -> Result<PathBuf> {
        let poll = policy.poll_interval.max(MIN_POLL_INTERVAL);
        let start = self.clock.now();
        log::info!(
            "Waiting for {} in {} (timeout {:.0}s, poll {:.1}s)",
            matcher.describe(),
            directory.display(),
            policy.timeout.as_secs_f64(),
            poll.as_secs_f64()
        );

        let mut last_progress = None;
        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            let mut found = list_matches(matcher, directory)?;

            if !found.is_empty() {
                if found.len() > 1 {
                    log::warn!(
                        "{} files match {} in {}; using {}",
                        found.len(),
                        matcher.describe(),
                        directory.display(),
                        found[0]
                    );
                }
                let path = directory.join(found.swap_remove(0));
                log::info!(
                    "Found {} after {:.1}s",
                    path.display(),
                    elapsed.as_secs_f64()
                );
                if !policy.settle_delay.is_zero() {
                    log::debug!(
                        "Settling for {:.1}s before reading",
                        policy.settle_delay.as_secs_f64()
                    );
                    self.sleep(policy.settle_delay, "settling on artifact")?;
                }
                return Ok(path);
            }

            if elapsed >= policy.timeout {
                return Err(Error::ArtifactTimeout {
                    elapsed,
                    directory: directory.to_path_buf(),
                    matcher: matcher.describe(),
                });
            }

            let level = if progress_due(last_progress, elapsed) {
                last_progress = Some(elapsed);
                log::Level::Info
            } else {
                log::Level::Debug
            };
            log::log!(
                level,
                "Still waiting for {} in {} ({:.0}s elapsed)",
                matcher.describe(),
                directory.display(),
                elapsed.as_secs_f64()
            );
            self.sleep(poll.min(policy.timeout - elapsed), "waiting for artifact")?;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.load(Ordering::Relaxed))
    }

    /// Sleep, waking periodically to honor the shutdown flag.
    fn sleep(&self, duration: Duration, activity: &str) -> Result<()> {
        if self.running.is_none() {
            self.clock.sleep(duration);
            return Ok(());
        }

        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return Err(Error::Cancelled(activity.to_string()));
            }
            let step = remaining.min(CANCEL_CHECK_INTERVAL);
            self.clock.sleep(step);
            remaining -= step;
        }
        if self.is_cancelled() {
            return Err(Error::Cancelled(activity.to_string()));
        }
        Ok(())
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::system()
    }
}

/// Progress goes to info on the first poll and then every
/// [`PROGRESS_INTERVAL`]; faster polls only log at debug.
fn progress_due(last: Option<Duration>, elapsed: Duration) -> bool {
    last.is_none_or(|t| elapsed.saturating_sub(t) >= PROGRESS_INTERVAL)
}

/// Sorted names of regular files in `directory` accepted by `matcher`.
fn list_matches(matcher: &dyn ArtifactMatcher, directory: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::storage(
                directory,
                format!("Failed to list directory: {}", e),
            ));
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::storage(directory, format!("Failed to list directory: {}", e)))?;
        if let Some(name) = entry.file_name().to_str()
            && matcher.matches(name)
            && entry.path().is_file()
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
