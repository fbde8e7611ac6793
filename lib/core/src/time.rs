//! Wall-clock time in whole epoch seconds.
//!
//! Provider tokens carry absolute expiry as seconds since the Unix epoch.
//! Everything that compares against "now" goes through [`Clock`] so the
//! unit is fixed in one place and tests can pin the current time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// An absolute point in time, in seconds since the Unix epoch.
///
/// Never milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochSeconds(i64);

impl EpochSeconds {
    /// Creates a timestamp from raw epoch seconds.
    #[must_use]
    pub const fn new(secs: i64) -> Self {
        Self(secs)
    }

    /// Returns the raw epoch seconds.
    #[must_use]
    pub const fn as_secs(self) -> i64 {
        self.0
    }

    /// Returns this timestamp moved forward by `secs` seconds.
    ///
    /// Saturates instead of overflowing.
    #[must_use]
    pub const fn plus_secs(self, secs: u64) -> Self {
        let secs = if secs > i64::MAX as u64 {
            i64::MAX
        } else {
            secs as i64
        };
        Self(self.0.saturating_add(secs))
    }

    /// Returns this timestamp moved backward by `secs` seconds.
    #[must_use]
    pub const fn minus_secs(self, secs: u64) -> Self {
        let secs = if secs > i64::MAX as u64 {
            i64::MAX
        } else {
            secs as i64
        };
        Self(self.0.saturating_sub(secs))
    }

    /// Converts a chrono timestamp, flooring sub-second precision.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp())
    }
}

impl fmt::Display for EpochSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EpochSeconds {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time in whole epoch seconds.
    fn now(&self) -> EpochSeconds;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EpochSeconds {
        EpochSeconds::from_datetime(Utc::now())
    }
}

/// A clock that only moves when told to.
///
/// Intended for tests of time-dependent state machines.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: EpochSeconds) -> Self {
        Self {
            now: AtomicI64::new(now.as_secs()),
        }
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Sets the clock to `now`.
    pub fn set(&self, now: EpochSeconds) {
        self.now.store(now.as_secs(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EpochSeconds {
        EpochSeconds::new(self.now.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> EpochSeconds {
        (**self).now()
    }
}
