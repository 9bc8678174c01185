//! Time source abstraction.
//!
//! The engine never calls `Utc::now()` directly so that simulations and
//! tests can drive it through a [`ManualClock`].

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Start of the `minutes`-wide bucket containing `ts`.
pub fn floor_to_bucket(ts: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    let width = i64::from(minutes.max(1)) * 60;
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(width);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}
