use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored power reading. `timestamp` is the start of its storage bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSample {
    pub timestamp: DateTime<Utc>,
    pub power_watt: f64,
}

impl MeasurementSample {
    pub fn new(timestamp: DateTime<Utc>, power_watt: f64) -> Self {
        Self {
            timestamp,
            power_watt,
        }
    }
}
