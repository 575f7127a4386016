//! Time source used by the response cache
//!
//! Expiry checks go through a `Clock` so tests can move time forward instead
//! of sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

/// Source of the current instant
pub trait Clock: Send + Sync {
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

/// Manually driven clock for tests
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<DateTime<Utc>>,
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl MockClock {
    pub fn with_time(time: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    pub fn new() -> Self {
        Self::with_time(Utc::now())
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}
