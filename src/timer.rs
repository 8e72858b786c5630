//! Countdown timers
//!
//! A countdown is never decremented. Every tick recomputes the remaining
//! time from the authoritative start instant and the wall clock, so a
//! reconnecting client lands on the correct value without asking anyone.

use web_time::{Duration, SystemTime};

/// Time left until a fixed deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    started_at: SystemTime,
    limit: Duration,
}

impl Countdown {
    /// A countdown of `limit` anchored at `started_at`
    pub fn new(started_at: SystemTime, limit: Duration) -> Self {
        Self { started_at, limit }
    }

    /// The instant the countdown reaches zero
    pub fn deadline(&self) -> SystemTime {
        self.started_at + self.limit
    }

    /// Time since the start, zero if `now` is before it
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        now.duration_since(self.started_at).unwrap_or_default()
    }

    /// Time left at `now`, zero once the deadline has passed
    pub fn remaining(&self, now: SystemTime) -> Duration {
        self.deadline().duration_since(now).unwrap_or_default()
    }

    /// Whether the deadline has been reached
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.remaining(now).is_zero()
    }

    /// Whether more than half of the time has elapsed
    pub fn past_halfway(&self, now: SystemTime) -> bool {
        self.elapsed(now).saturating_mul(2) > self.limit
    }
}

/// Formats a duration as `MM:SS`, rounding partial seconds up
pub fn format_remaining(remaining: Duration) -> String {
    let seconds = remaining.as_millis().div_ceil(1000);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// The single armed countdown of a client
///
/// Arming replaces any previous countdown, so a client never runs two timers.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    armed: Option<Countdown>,
}

impl Ticker {
    /// A disarmed ticker polling every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            armed: None,
        }
    }

    /// Arms `countdown`, replacing the current one
    ///
    /// # Returns
    ///
    /// `true` if the armed countdown changed
    pub fn arm(&mut self, countdown: Countdown) -> bool {
        self.armed.replace(countdown) != Some(countdown)
    }

    /// Stops ticking
    pub fn disarm(&mut self) {
        self.armed = None;
    }

    /// The armed countdown
    pub fn countdown(&self) -> Option<&Countdown> {
        self.armed.as_ref()
    }

    /// How long the host should wait before the next tick
    ///
    /// This is the poll interval, shortened so the tick lands on the
    /// deadline. `None` while disarmed.
    pub fn next_wakeup(&self, now: SystemTime) -> Option<Duration> {
        self.armed
            .map(|countdown| countdown.remaining(now).min(self.interval))
    }
}
