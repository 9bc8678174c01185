//! Weather forecast supply.
//!
//! The engine only needs `(timestamp, features)` records for a station.
//! Where they come from is the supplier's business; this module ships a
//! file-based supplier and the archive that keeps past records around so
//! that measurements can still be joined with the forecast that was valid
//! when they were taken.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::domain::{ForecastError, WeatherRecord};
use crate::repo::{time_key, BlobStore};

const ARCHIVE_PREFIX: &str = "weather";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Current forecast records for `station_id`.
    async fn fetch(&self, station_id: &str) -> Result<Vec<WeatherRecord>>;
}

/// Reads `<dir>/<station_id>.json`, a JSON array of weather records.
#[derive(Debug, Clone)]
pub struct JsonFileWeatherProvider {
    dir: PathBuf,
}

impl JsonFileWeatherProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl WeatherProvider for JsonFileWeatherProvider {
    async fn fetch(&self, station_id: &str) -> Result<Vec<WeatherRecord>> {
        let path = self.dir.join(format!("{station_id}.json"));
        debug!(path = %path.display(), "reading weather forecast");
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read weather file {}", path.display()))?;
        let records: Vec<WeatherRecord> = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse weather file {}", path.display()))?;
        info!(station_id, records = records.len(), "weather forecast loaded");
        Ok(records)
    }
}

/// Persist accepted records so that they survive a restart.
pub(crate) fn archive_records(
    store: &dyn BlobStore,
    records: &[WeatherRecord],
) -> Result<(), ForecastError> {
    for record in records {
        let key = time_key(ARCHIVE_PREFIX, record.timestamp)?;
        store.write(&key, &serde_json::to_vec(record)?)?;
    }
    Ok(())
}

/// Every archived record; unreadable entries are logged and skipped.
pub(crate) fn load_archive(store: &dyn BlobStore) -> Result<Vec<WeatherRecord>, ForecastError> {
    let keys = store.list_since(ARCHIVE_PREFIX, DateTime::<Utc>::MIN_UTC)?;
    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(bytes) = store.read(&key)? else {
            continue;
        };
        match serde_json::from_slice::<WeatherRecord>(&bytes) {
            Ok(record) => records.push(record),
            Err(e) => warn!(%key, error = %e, "skipping unreadable weather record"),
        }
    }
    Ok(records)
}
