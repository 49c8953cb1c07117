//! Deadline-bounded polling

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for polling loops
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Runs a check at a fixed interval until it yields a value or the deadline
/// passes.
///
/// The deadline is computed once when [`poll`](Self::poll) starts. The check
/// always runs at least once, so a zero timeout means a single attempt with
/// no sleep. A timeout too large to add to the clock never expires.
#[derive(Clone)]
pub struct Poller {
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(interval, Arc::new(SystemClock))
    }

    pub fn with_clock(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { interval, clock }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn poll<T, E>(
        &self,
        timeout: Duration,
        mut check: impl FnMut() -> Result<Option<T>, E>,
        on_timeout: impl FnOnce() -> E,
    ) -> Result<T, E> {
        let deadline = self.clock.now().checked_add(timeout);
        loop {
            if let Some(value) = check()? {
                return Ok(value);
            }
            if deadline.is_some_and(|deadline| self.clock.now() >= deadline) {
                return Err(on_timeout());
            }
            self.clock.sleep(self.interval);
        }
    }
}
