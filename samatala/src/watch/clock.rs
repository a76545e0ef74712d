//! Time sources for bounded waits.
//!
//! [`SystemClock`] is used in production. [`ManualClock`] advances only when
//! slept on, which keeps timeout tests deterministic and instantaneous.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

type Action = Box<dyn FnOnce() + Send>;

struct ManualState {
    now: Duration,
    /// Pending actions, fired in insertion order once `now` reaches them
    scheduled: Vec<(Duration, Action)>,
}

/// Simulated time that moves only on [`Clock::sleep`] or [`ManualClock::advance`].
///
/// Actions registered with [`ManualClock::schedule_at`] run when time passes
/// their deadline, e.g. to drop an artifact into a watched directory mid-wait.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Duration::ZERO,
                scheduled: Vec::new(),
            })),
        }
    }

    /// Run `action` once simulated time reaches `at`.
    pub fn schedule_at(&self, at: Duration, action: impl FnOnce() + Send + 'static) {
        let due = {
            let mut state = self.state.lock();
            if at <= state.now {
                Some(Box::new(action) as Action)
            } else {
                state.scheduled.push((at, Box::new(action)));
                None
            }
        };
        if let Some(action) = due {
            action();
        }
    }

    /// Move time forward and fire due actions.
    pub fn advance(&self, duration: Duration) {
        let due: Vec<Action> = {
            let mut state = self.state.lock();
            state.now += duration;
            let now = state.now;
            let (due, pending): (Vec<_>, Vec<_>) =
                state.scheduled.drain(..).partition(|(at, _)| *at <= now);
            state.scheduled = pending;
            due.into_iter().map(|(_, action)| action).collect()
        };
        // Outside the lock so actions may use the clock
        for action in due {
            action();
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
