//! Training pairs and the retrain pipeline.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, info};

use super::{FeatureSubset, FeatureVector, RandomForestModel, ValidationMetrics};
use crate::config::ModelConfig;

/// Hold-out scoring is skipped below this many pairs.
const MIN_PAIRS_FOR_VALIDATION: usize = 10;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrainingError {
    #[error("Not enough training data: {have} pairs, {need} required")]
    InsufficientData { have: usize, need: usize },

    #[error("Malformed training data: {0}")]
    ShapeMismatch(String),

    #[error("Model fit failed: {0}")]
    Fit(String),
}

/// One (features at t, measured watts at t) example.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPair {
    pub features: FeatureVector,
    pub power_watt: f64,
}

impl TrainingPair {
    pub fn new(features: FeatureVector, power_watt: f64) -> Self {
        Self {
            features,
            power_watt,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.features.timestamp
    }
}

/// Growing set of training pairs, one per measurement bucket.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pairs: BTreeMap<DateTime<Utc>, TrainingPair>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair; a pair for the same instant replaces the old one.
    pub fn insert(&mut self, pair: TrainingPair) {
        self.pairs.insert(pair.timestamp(), pair);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in chronological order.
    pub fn pairs(&self) -> impl Iterator<Item = &TrainingPair> {
        self.pairs.values()
    }

    pub fn to_vec(&self) -> Vec<TrainingPair> {
        self.pairs.values().cloned().collect()
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.pairs.contains_key(&timestamp)
    }

    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.pairs.keys().next()?;
        let last = self.pairs.keys().next_back()?;
        Some((*first, *last))
    }

    /// Take every pair out, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = TrainingPair> {
        std::mem::take(&mut self.pairs).into_values()
    }
}

impl Extend<TrainingPair> for TrainingSet {
    fn extend<I: IntoIterator<Item = TrainingPair>>(&mut self, iter: I) {
        for pair in iter {
            self.insert(pair);
        }
    }
}

/// Median hold-out score of one candidate feature set.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub feature_set: String,
    pub metrics: ValidationMetrics,
}

/// Model Trainer
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: ModelConfig,
}

impl ModelTrainer {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Reject a pair the forest cannot learn from.
    pub fn check_pair(pair: &TrainingPair, n_features: usize) -> Result<(), TrainingError> {
        if pair.features.len() != n_features {
            return Err(TrainingError::ShapeMismatch(format!(
                "pair at {} has {} features, expected {}",
                pair.timestamp(),
                pair.features.len(),
                n_features
            )));
        }
        if pair.features.values().iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::ShapeMismatch(format!(
                "pair at {} has a non-finite feature",
                pair.timestamp()
            )));
        }
        if !pair.power_watt.is_finite() || pair.power_watt < 0.0 {
            return Err(TrainingError::ShapeMismatch(format!(
                "pair at {} has invalid power {}",
                pair.timestamp(),
                pair.power_watt
            )));
        }
        Ok(())
    }

    /// Fit a forest on `pairs` (chronological order).
    ///
    /// With enough data every candidate feature set is scored on several
    /// hold-out blocks; the candidate with the lowest median MAE wins, the
    /// earlier candidate on ties. The returned model is always fitted on
    /// every pair using the winning feature set.
    pub fn train(
        &self,
        pairs: &[TrainingPair],
        feature_names: &[String],
        candidates: &[FeatureSubset],
    ) -> Result<RandomForestModel, TrainingError> {
        for pair in pairs {
            Self::check_pair(pair, feature_names.len())?;
        }

        let x: Vec<Vec<f64>> = pairs.iter().map(|p| p.features.values().to_vec()).collect();
        let y: Vec<f64> = pairs.iter().map(|p| p.power_watt).collect();

        let full = [FeatureSubset::all(feature_names.len())];
        let candidates = if candidates.is_empty() { &full[..] } else { candidates };

        let scores = self.score_candidates(&x, &y, feature_names, candidates)?;
        let (winner, validation) = scores
            .iter()
            .zip(candidates)
            .min_by_key(|(score, _)| OrderedFloat(score.metrics.mae))
            .map(|(score, subset)| (subset, Some(score.metrics)))
            .unwrap_or((&candidates[0], None));

        let mut model = RandomForestModel::fit(&x, &y, &self.config, feature_names, winner)?;
        model.metadata.validation_metrics = validation;

        match validation {
            Some(m) => info!(
                samples = pairs.len(),
                feature_set = %winner.name,
                candidates = candidates.len(),
                mae = m.mae,
                rmse = m.rmse,
                r2 = m.r2,
                "forest fitted"
            ),
            None => info!(
                samples = pairs.len(),
                feature_set = %winner.name,
                "forest fitted without hold-out"
            ),
        }
        Ok(model)
    }

    /// Median hold-out metrics per candidate, in candidate order. Empty when
    /// the set is too small to hold anything out.
    pub fn score_candidates(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        feature_names: &[String],
        candidates: &[FeatureSubset],
    ) -> Result<Vec<CandidateScore>, TrainingError> {
        let blocks = self.hold_out_blocks(x.len());
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores = Vec::with_capacity(candidates.len());
        for subset in candidates {
            let mut runs = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let (train_x, train_y): (Vec<Vec<f64>>, Vec<f64>) = x
                    .iter()
                    .zip(y)
                    .enumerate()
                    .filter(|(i, _)| !block.contains(i))
                    .map(|(_, (row, target))| (row.clone(), *target))
                    .unzip();
                let model =
                    RandomForestModel::fit(&train_x, &train_y, &self.config, feature_names, subset)?;
                let predictions: Vec<f64> = model
                    .predict_rows(&x[block.clone()])?
                    .into_iter()
                    .map(|p| p.max(0.0))
                    .collect();
                runs.push(self.calculate_metrics(&predictions, &y[block.clone()])?);
            }
            runs.sort_by_key(|m| OrderedFloat(m.mae));
            let median = runs[runs.len() / 2];
            debug!(
                feature_set = %subset.name,
                rounds = runs.len(),
                mae = median.mae,
                rmse = median.rmse,
                "candidate scored"
            );
            scores.push(CandidateScore {
                feature_set: subset.name.clone(),
                metrics: median,
            });
        }
        Ok(scores)
    }

    /// Contiguous hold-out blocks, newest first, one per validation round.
    fn hold_out_blocks(&self, n: usize) -> Vec<Range<usize>> {
        let split = self.config.validation_split;
        if n < MIN_PAIRS_FOR_VALIDATION || split <= 0.0 {
            return Vec::new();
        }
        let split_idx = (n as f64 * (1.0 - split)).floor() as usize;
        if split_idx < 2 || split_idx >= n {
            return Vec::new();
        }
        let width = n - split_idx;
        (0..self.config.validation_rounds.max(1))
            .map_while(|round| {
                let end = n.checked_sub(width * round)?;
                let start = end.checked_sub(width)?;
                Some(start..end)
            })
            .collect()
    }

    /// Calculate validation metrics
    pub fn calculate_metrics(
        &self,
        predictions: &[f64],
        targets: &[f64],
    ) -> Result<ValidationMetrics, TrainingError> {
        if predictions.len() != targets.len() {
            return Err(TrainingError::ShapeMismatch(
                "prediction and target count mismatch".to_string(),
            ));
        }

        if predictions.is_empty() {
            return Err(TrainingError::InsufficientData { have: 0, need: 1 });
        }

        let n = predictions.len() as f64;

        // Mean Absolute Error
        let mae: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / n;

        // Root Mean Square Error
        let mse: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / n;
        let rmse = mse.sqrt();

        // Mean Absolute Percentage Error
        let mape: f64 = predictions
            .iter()
            .zip(targets.iter())
            .filter(|(_, t)| t.abs() > 1e-10) // Avoid division by zero
            .map(|(p, t)| ((p - t) / t).abs() * 100.0)
            .sum::<f64>()
            / n;

        // R-squared
        let mean_target: f64 = targets.iter().sum::<f64>() / n;
        let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
        let ss_res: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| (t - p).powi(2))
            .sum();

        let r2 = if ss_tot.abs() < 1e-10 {
            0.0
        } else {
            1.0 - (ss_res / ss_tot)
        };

        Ok(ValidationMetrics::new(mae, rmse, mape, r2))
    }
}
