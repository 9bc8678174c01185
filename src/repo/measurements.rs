//! Measurement store: append/overwrite log of real PV power readings.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{parse_time_key, time_key, BlobStore, StorageError};
use crate::domain::{ForecastError, MeasurementSample};
use crate::utils::{floor_to_bucket, Clock};

const PREFIX: &str = "measurements";

/// Time-bucketed power log on top of a [`BlobStore`].
///
/// One sample per bucket; a later reading in the same bucket replaces the
/// earlier one. Writes are serialized so the last arrival wins.
pub struct MeasurementStore {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    bucket_minutes: u32,
    write_lock: Mutex<()>,
}

impl MeasurementStore {
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, bucket_minutes: u32) -> Self {
        Self {
            blobs,
            clock,
            bucket_minutes,
            write_lock: Mutex::new(()),
        }
    }

    /// Validate and durably store a reading, returning the stored sample.
    pub fn record(
        &self,
        timestamp: DateTime<Utc>,
        power_watt: f64,
    ) -> Result<MeasurementSample, ForecastError> {
        if !power_watt.is_finite() || power_watt < 0.0 {
            return Err(ForecastError::InvalidReading(format!(
                "power must be a non-negative number, got {power_watt}"
            )));
        }
        let now = self.clock.now();
        if timestamp > now {
            return Err(ForecastError::InvalidReading(format!(
                "timestamp {timestamp} lies in the future (now {now})"
            )));
        }

        let bucket = floor_to_bucket(timestamp, self.bucket_minutes);
        let key = time_key(PREFIX, bucket)
            .map_err(|e| ForecastError::InvalidReading(e.to_string()))?;
        let sample = MeasurementSample::new(bucket, power_watt);
        let bytes = serde_json::to_vec(&sample)?;

        let _guard = self.write_lock.lock();
        self.blobs.write(&key, &bytes)?;
        debug!(bucket = %bucket, power_watt, "measurement recorded");
        Ok(sample)
    }

    /// Samples with `since <= timestamp < until`, oldest first.
    ///
    /// Keys are listed when called; each sample is read from storage as the
    /// iterator advances.
    pub fn history(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<MeasurementHistory, ForecastError> {
        let keys = self
            .blobs
            .list_since(PREFIX, since)?
            .into_iter()
            .filter(|key| parse_time_key(PREFIX, key).is_some_and(|ts| ts < until))
            .collect::<Vec<_>>();
        Ok(MeasurementHistory {
            blobs: Arc::clone(&self.blobs),
            keys: keys.into_iter(),
        })
    }

    /// Every stored sample.
    pub fn all(&self) -> Result<MeasurementHistory, ForecastError> {
        self.history(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
    }

    pub fn latest(&self) -> Result<Option<MeasurementSample>, ForecastError> {
        let Some(key) = self
            .blobs
            .list_since(PREFIX, DateTime::<Utc>::MIN_UTC)?
            .pop()
        else {
            return Ok(None);
        };
        read_sample(self.blobs.as_ref(), &key)
    }
}

fn read_sample(
    blobs: &dyn BlobStore,
    key: &str,
) -> Result<Option<MeasurementSample>, ForecastError> {
    let Some(bytes) = blobs.read(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Lazy iterator over stored measurement samples.
pub struct MeasurementHistory {
    blobs: Arc<dyn BlobStore>,
    keys: std::vec::IntoIter<String>,
}

impl Iterator for MeasurementHistory {
    type Item = Result<MeasurementSample, ForecastError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = self.keys.next()?;
            match read_sample(self.blobs.as_ref(), &key) {
                Ok(Some(sample)) => return Some(Ok(sample)),
                // Listed but gone; nothing to yield for this bucket.
                Ok(None) => continue,
                Err(e) => {
                    warn!(%key, error = %e, "unreadable measurement sample");
                    return Some(Err(e));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.keys.len()))
    }
}
