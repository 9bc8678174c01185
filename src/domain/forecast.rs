use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicted power at one instant of the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: DateTime<Utc>,
    pub predicted_watt: f64,
}

impl PowerSample {
    pub fn new(timestamp: DateTime<Utc>, predicted_watt: f64) -> Self {
        Self {
            timestamp,
            predicted_watt,
        }
    }
}

/// A contiguous window of the horizon, characterised by its mean power.
///
/// `end_time` is exclusive: a three hour frame starting at 10:00 ends at 13:00.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub average_watt: f64,
}

impl TimeFrame {
    pub fn width(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Energy above `base_watt` expected over the frame, in watt hours.
    pub fn surplus_watt_hours(&self, base_watt: f64) -> f64 {
        let hours = self.width().num_seconds() as f64 / 3600.0;
        (self.average_watt - base_watt).max(0.0) * hours
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {:.0} W",
            self.start_time.format("%d.%m %H:%M"),
            self.end_time.format("%H:%M"),
            self.average_watt
        )
    }
}
