//! Feature engineering for the PV model.
//!
//! A feature vector is the weather record nearest to the queried instant
//! followed by calendar features taken from the local time of that instant.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::domain::{ForecastError, WeatherRecord};
use crate::ml::{FeatureSubset, FeatureVector};

/// Names and meaning of the weather part of a feature vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    pub weather_features: Vec<String>,
    /// Index of the irradiance feature, if the weather carries one.
    pub irradiance_index: Option<usize>,
}

impl FeatureLayout {
    pub fn new(weather_features: Vec<String>, irradiance_index: Option<usize>) -> Self {
        Self {
            weather_features,
            irradiance_index,
        }
    }

    /// All feature names in model-input order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.weather_features.clone();
        names.push("hour_of_day".to_string());
        names.push("day_of_year".to_string());
        names
    }

    pub fn weather_len(&self) -> usize {
        self.weather_features.len()
    }

    /// Feature sets the trainer chooses from: everything, irradiance with
    /// the calendar, and irradiance plus one more weather feature.
    pub fn candidates(&self) -> Vec<FeatureSubset> {
        let n = self.weather_len();
        let (hour, day) = (n, n + 1);
        let mut candidates = vec![FeatureSubset::all(n + 2)];
        let Some(irradiance) = self.irradiance_index.filter(|_| n > 1) else {
            return candidates;
        };
        let irradiance_name = &self.weather_features[irradiance];
        candidates.push(FeatureSubset::new(
            irradiance_name.clone(),
            vec![irradiance, hour, day],
        ));
        if n > 2 {
            for other in (0..n).filter(|&i| i != irradiance) {
                let mut columns = vec![irradiance, other];
                columns.sort_unstable();
                columns.extend([hour, day]);
                candidates.push(FeatureSubset::new(
                    format!("{irradiance_name}+{}", self.weather_features[other]),
                    columns,
                ));
            }
        }
        candidates
    }
}

/// Weather archive plus the rules for turning it into model input.
pub struct FeatureBuilder {
    layout: FeatureLayout,
    timezone: Tz,
    max_staleness: Duration,
    records: RwLock<BTreeMap<DateTime<Utc>, WeatherRecord>>,
    revision: AtomicU64,
}

impl FeatureBuilder {
    pub fn new(layout: FeatureLayout, timezone: Tz, max_staleness: Duration) -> Self {
        Self {
            layout,
            timezone,
            max_staleness,
            records: RwLock::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    /// Bumped whenever the archive changes.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Add weather records, replacing any existing record for the same
    /// instant. Records of the wrong shape or with missing values are
    /// skipped. Returns the records that were accepted.
    pub fn ingest<I>(&self, records: I) -> Vec<WeatherRecord>
    where
        I: IntoIterator<Item = WeatherRecord>,
    {
        let mut accepted = Vec::new();
        let mut rejected = 0usize;
        {
            let mut archive = self.records.write();
            for record in records {
                if record.features.len() != self.layout.weather_len() || !record.is_complete() {
                    rejected += 1;
                    continue;
                }
                archive.insert(record.timestamp, record.clone());
                accepted.push(record);
            }
        }
        if rejected > 0 {
            warn!(
                rejected,
                expected_features = self.layout.weather_len(),
                "weather records skipped"
            );
        }
        if !accepted.is_empty() {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
        accepted
    }

    /// The record closest to `at` within the staleness bound; the earlier
    /// one wins when two are equally close.
    pub fn nearest(&self, at: DateTime<Utc>) -> Option<WeatherRecord> {
        let archive = self.records.read();
        let before = archive.range(..=at).next_back().map(|(_, r)| r);
        let after = archive
            .range((Bound::Excluded(at), Bound::Unbounded))
            .next()
            .map(|(_, r)| r);

        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if a.timestamp - at < at - b.timestamp {
                    a
                } else {
                    b
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        let distance = if best.timestamp >= at {
            best.timestamp - at
        } else {
            at - best.timestamp
        };
        (distance <= self.max_staleness).then(|| best.clone())
    }

    pub fn build(&self, at: DateTime<Utc>) -> Result<FeatureVector, ForecastError> {
        let record = self.nearest(at).ok_or(ForecastError::NoWeatherData { at })?;
        Ok(self.vectorize(at, &record))
    }

    fn vectorize(&self, at: DateTime<Utc>, record: &WeatherRecord) -> FeatureVector {
        let local = at.with_timezone(&self.timezone);
        // Quarter-hour resolution keeps the feature stable across buckets.
        let hour_of_day = f64::from(local.hour()) + f64::from(local.minute() / 15) * 0.25;
        let day_of_year = f64::from(local.ordinal());
        let daylight = self
            .layout
            .irradiance_index
            .and_then(|i| record.features.get(i))
            .map_or(true, |irradiance| *irradiance > 0.0);
        FeatureVector::new(at, &record.features, hour_of_day, day_of_year, daylight)
    }
}
