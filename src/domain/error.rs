use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ml::TrainingError;
use crate::repo::StorageError;

/// Errors surfaced by the forecast engine and its collaborators.
///
/// `InvalidReading`, `NoWeatherData`, `ForecastUnavailable` and
/// `ModelNotTrained` are recoverable: the caller skips the current cycle and
/// tries again later. `InvalidWidth` is a programming error on the caller's
/// side.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Invalid power reading: {0}")]
    InvalidReading(String),

    #[error("No weather record within reach of {at}")]
    NoWeatherData { at: DateTime<Utc> },

    #[error("Forecast unavailable for {at}: no usable weather data")]
    ForecastUnavailable { at: DateTime<Utc> },

    #[error("Forecast model has not been trained yet")]
    ModelNotTrained,

    #[error("Invalid window width: {0} hours")]
    InvalidWidth(f64),

    #[error("Training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ForecastError {
    /// Whether the caller may simply retry on its next cycle.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidWidth(_) | Self::Config(_))
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for ForecastError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
