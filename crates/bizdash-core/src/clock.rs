//! Time source used for edit and sync timestamps.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

/// Wall-clock timestamp used throughout the engine.
pub type Timestamp = DateTime<Utc>;

/// Source of the current time.
///
/// The store and the sync engine never call `Utc::now()` directly so that
/// last-writer-wins decisions can be tested with fixed timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Creates a clock frozen at the given Unix second.
    pub fn at_secs(secs: i64) -> Self {
        Self {
            now: Mutex::new(timestamp_secs(secs)),
        }
    }

    /// Moves the clock to the given Unix second.
    pub fn set_secs(&self, secs: i64) {
        *self.lock() = timestamp_secs(secs);
    }

    /// Advances the clock by the given number of seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.lock();
        *now += Duration::seconds(secs);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        // A poisoned clock still holds a valid timestamp.
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.lock()
    }
}

/// Builds a timestamp from Unix seconds, clamping out-of-range input to the epoch.
pub fn timestamp_secs(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
