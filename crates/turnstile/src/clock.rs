//! Time source for claim validation

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Source of the current instant
///
/// Claim validation never reads the wall clock directly so that expiry and
/// not-before boundaries can be tested exactly.
pub trait Clock: Send + Sync + Debug {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Freeze the clock at `instant`
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// Freeze the clock at a Unix timestamp in seconds
    ///
    /// Out-of-range timestamps fall back to the Unix epoch.
    pub fn at_timestamp(secs: i64) -> Self {
        Self(DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
