//! Time sources.
//!
//! Caches and the ranking planner read time through [`Clock`] so tests can move it by hand.

use std::{
    fmt,
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// A source of monotonic and wall-clock time.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Monotonic now, for expiry checks.
    fn now(&self) -> Instant;

    /// Wall-clock now, for time-window filters.
    fn utc(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    /// Monotonic origin.
    start: Instant,
    /// Wall-clock origin.
    start_utc: DateTime<Utc>,
    /// Time advanced so far.
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at `utc`.
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self {
            start: Instant::now(),
            start_utc: utc,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }

    fn utc(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(*self.elapsed.lock()).unwrap_or(TimeDelta::MAX);
        self.start_utc
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
