//! Wall-clock abstraction. Every time computation in the SDK core (fetch rate limit, redisplay
//! delay, session duration, dynamic triggers) reads the time through a [`Clock`], so it can be
//! driven deterministically in tests.
use chrono::{DateTime, Utc};

/// Point in time, in UTC.
pub type Timestamp = DateTime<Utc>;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

impl<T: Fn() -> Timestamp + Send + Sync> Clock for T {
    fn now(&self) -> Timestamp {
        self()
    }
}
