//! SmartCore random forest wrapper.
//!
//! Trees are grown from a fixed seed, so identical training pairs give
//! identical forests, and a forest restored from its serialized form gives
//! identical predictions.

use ::smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use ::smartcore::linalg::basic::matrix::DenseMatrix;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{FeatureSubset, FeatureVector, ModelMetadata, ModelType, TrainingError};
use crate::config::ModelConfig;
use crate::domain::ForecastError;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fitted forest plus the metadata needed to trust it after a restart.
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub metadata: ModelMetadata,
    subset: FeatureSubset,
    forest: Forest,
}

impl RandomForestModel {
    pub fn parameters(cfg: &ModelConfig) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: cfg.max_depth,
            min_samples_leaf: cfg.min_samples_leaf,
            min_samples_split: cfg.min_samples_split,
            n_trees: cfg.n_trees,
            m: None, // Use sqrt(n_features) by default
            keep_samples: false,
            seed: cfg.seed,
        }
    }

    /// Fit a forest on the `subset` columns of feature rows `x` and
    /// measured watts `y`. Rows always carry every column of `feature_names`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        cfg: &ModelConfig,
        feature_names: &[String],
        subset: &FeatureSubset,
    ) -> Result<Self, TrainingError> {
        if x.len() < 2 {
            return Err(TrainingError::InsufficientData { have: x.len(), need: 2 });
        }
        if x.len() != y.len() {
            return Err(TrainingError::ShapeMismatch(format!(
                "{} feature rows, {} targets",
                x.len(),
                y.len()
            )));
        }

        if subset.columns.is_empty() || subset.columns.iter().any(|&c| c >= feature_names.len()) {
            return Err(TrainingError::ShapeMismatch(format!(
                "feature set '{}' does not fit {} features",
                subset.name,
                feature_names.len()
            )));
        }

        let matrix = to_matrix(x, feature_names.len(), subset)?;
        let forest = Forest::fit(&matrix, &y.to_vec(), Self::parameters(cfg))
            .map_err(|e| TrainingError::Fit(format!("{e:?}")))?;

        let metadata = ModelMetadata {
            model_id: format!("rf_{}", uuid::Uuid::new_v4()),
            model_type: ModelType::RandomForest,
            trained_at: Utc::now(),
            training_samples: x.len(),
            validation_metrics: None,
            feature_names: feature_names.to_vec(),
            feature_set: subset.name.clone(),
            selected_features: subset
                .columns
                .iter()
                .map(|&c| feature_names[c].clone())
                .collect(),
        };
        Ok(Self {
            metadata,
            subset: subset.clone(),
            forest,
        })
    }


    /// Raw forest output for many rows, without clamping.
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, TrainingError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let matrix = to_matrix(rows, self.metadata.feature_names.len(), &self.subset)?;
        self.forest
            .predict(&matrix)
            .map_err(|e| TrainingError::Fit(format!("prediction failed: {e:?}")))
    }

    /// Predicted power for one feature vector; never negative.
    pub fn infer(&self, features: &FeatureVector) -> Result<f64, ForecastError> {
        let expected = self.metadata.feature_names.len();
        if features.len() != expected {
            return Err(ForecastError::Inference(format!(
                "feature count mismatch: expected {expected}, got {}",
                features.len()
            )));
        }

        let x = DenseMatrix::new(
            1,
            self.subset.columns.len(),
            self.subset.project(features.values()),
            false,
        );
        let predictions = self
            .forest
            .predict(&x)
            .map_err(|e| ForecastError::Inference(format!("{e:?}")))?;

        let value = predictions
            .first()
            .copied()
            .ok_or_else(|| ForecastError::Inference("model returned no prediction".to_string()))?;
        if !value.is_finite() {
            return Err(ForecastError::Inference(format!("non-finite prediction {value}")));
        }
        // Panels do not consume power.
        Ok(value.max(0.0))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ForecastError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ForecastError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn to_matrix(
    rows: &[Vec<f64>],
    n_features: usize,
    subset: &FeatureSubset,
) -> Result<DenseMatrix<f64>, TrainingError> {
    let mut flat = Vec::with_capacity(rows.len() * subset.columns.len());
    for row in rows {
        if row.len() != n_features {
            return Err(TrainingError::ShapeMismatch(format!(
                "expected {n_features} features per row, got {}",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::ShapeMismatch("non-finite feature value".to_string()));
        }
        flat.extend(subset.columns.iter().map(|&c| row[c]));
    }
    Ok(DenseMatrix::new(rows.len(), subset.columns.len(), flat, false))
}
