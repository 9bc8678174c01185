use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weather forecast for a single instant, as delivered by the supplier.
///
/// `features` follows the order configured in `weather.features`
/// (e.g. irradiance, cloud cover, temperature).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub timestamp: DateTime<Utc>,
    pub features: Vec<f64>,
}

impl WeatherRecord {
    pub fn new(timestamp: DateTime<Utc>, features: Vec<f64>) -> Self {
        Self {
            timestamp,
            features,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.features.iter().all(|v| v.is_finite())
    }
}
