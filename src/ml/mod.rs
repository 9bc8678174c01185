//! Machine learning for the PV forecast.
//!
//! - [`FeatureVector`]: model input built from weather and calendar data
//! - [`training`]: training pairs, hold-out scoring and the trainer
//! - [`smartcore`]: the random forest regressor wrapper that is persisted
//!   and used for inference

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

pub mod smartcore;
pub mod training;

pub use self::smartcore::RandomForestModel;
pub use training::{CandidateScore, ModelTrainer, TrainingError, TrainingPair, TrainingSet};

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ModelType {
    RandomForest,
}

/// ML Model Metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    /// Hold-out scores, absent when the set was too small to split.
    pub validation_metrics: Option<ValidationMetrics>,
    /// Full input layout the model expects at inference time.
    pub feature_names: Vec<String>,
    /// Candidate subset that won selection.
    pub feature_set: String,
    pub selected_features: Vec<String>,
}

/// Validation Metrics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub mape: f64, // Mean Absolute Percentage Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, mape: f64, r2: f64) -> Self {
        Self {
            mae,
            rmse,
            mape,
            r2,
        }
    }
}

/// A named choice of input columns, indices into a full [`FeatureVector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSubset {
    pub name: String,
    pub columns: Vec<usize>,
}

impl FeatureSubset {
    pub fn new(name: impl Into<String>, columns: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Every column of an `n`-wide vector.
    pub fn all(n: usize) -> Self {
        Self::new("full", (0..n).collect())
    }

    pub fn project(&self, row: &[f64]) -> Vec<f64> {
        self.columns.iter().map(|&c| row[c]).collect()
    }
}

/// Model input: weather features followed by hour of day and day of year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub timestamp: DateTime<Utc>,
    values: Vec<f64>,
    daylight: bool,
}

impl FeatureVector {
    pub fn new(
        timestamp: DateTime<Utc>,
        weather: &[f64],
        hour_of_day: f64,
        day_of_year: f64,
        daylight: bool,
    ) -> Self {
        let mut values = Vec::with_capacity(weather.len() + 2);
        values.extend_from_slice(weather);
        values.push(hour_of_day);
        values.push(day_of_year);
        Self {
            timestamp,
            values,
            daylight,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn weather(&self) -> &[f64] {
        &self.values[..self.values.len() - 2]
    }

    pub fn hour_of_day(&self) -> f64 {
        self.values[self.values.len() - 2]
    }

    pub fn day_of_year(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// The sun is down; such vectors never reach the model.
    pub fn is_dark(&self) -> bool {
        !self.daylight
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_feature_vector_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap();
        let fv = FeatureVector::new(ts, &[420.0, 30.0, 5.5], 10.0, 32.0, true);

        assert_eq!(fv.len(), 5);
        assert_eq!(fv.weather(), &[420.0, 30.0, 5.5]);
        assert_eq!(fv.hour_of_day(), 10.0);
        assert_eq!(fv.day_of_year(), 32.0);
        assert!(!fv.is_dark());
    }

    #[test]
    fn test_feature_subset_projects_columns() {
        let subset = FeatureSubset::new("irradiance", vec![0, 3, 4]);
        assert_eq!(subset.project(&[420.0, 30.0, 5.5, 10.0, 32.0]), vec![420.0, 10.0, 32.0]);
        assert_eq!(FeatureSubset::all(3).columns, vec![0, 1, 2]);
    }

    #[test]
    fn test_model_type_display() {
        assert_eq!(ModelType::RandomForest.to_string(), "random_forest");
    }
}
