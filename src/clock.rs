//! Wall-clock sources
//!
//! All time-dependent logic reads the current time through [`Clock`] so that
//! countdowns and phase labels can be driven deterministically in tests.

use std::sync::{Arc, Mutex, PoisonError};

use web_time::{Duration, SystemTime};

/// A source of wall-clock time
pub trait Clock: Send + Sync {
    /// Returns the current time
    fn now(&self) -> SystemTime;
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually driven clock
///
/// Clones share the same underlying instant, so a test can hand one copy
/// to the store and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`
    pub fn new(start: SystemTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Creates a clock frozen `millis` milliseconds after the Unix epoch
    pub fn at_millis(millis: u64) -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += by;
    }

    /// Jumps the clock to `to`
    pub fn set(&self, to: SystemTime) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
