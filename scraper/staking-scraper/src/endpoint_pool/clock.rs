//! A source of monotonic time for quarantine expiries

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

/// A monotonic clock
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> Instant;
}

/// The system's monotonic clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually advanced clock used in tests
#[derive(Debug)]
pub struct MockClock {
    /// The current instant
    now: Mutex<Instant>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }
}

impl MockClock {
    /// Advance the clock by the given duration
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
