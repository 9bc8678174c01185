//! Durable storage collaborators.
//!
//! Everything the engine persists goes through a [`BlobStore`]: measurement
//! samples, archived weather records and the current model snapshot.
//! Time-indexed entries use keys of the form `"{prefix}/{unix_seconds:020}"`
//! so that lexical order matches chronological order.

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

pub mod file;
pub mod measurements;
pub mod memory;

pub use file::FileBlobStore;
pub use measurements::{MeasurementHistory, MeasurementStore};
pub use memory::MemoryBlobStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Key-value blob store with time-ordered listing.
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under `key`; the write is durable once this returns.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Time-indexed keys below `prefix` at or after `since`, oldest first.
    fn list_since(&self, prefix: &str, since: DateTime<Utc>) -> Result<Vec<String>, StorageError>;
}

/// Build the time-indexed key for `ts` below `prefix`.
pub fn time_key(prefix: &str, ts: DateTime<Utc>) -> Result<String, StorageError> {
    let secs = u64::try_from(ts.timestamp())
        .map_err(|_| StorageError::InvalidKey(format!("{prefix}/{ts} precedes the Unix epoch")))?;
    Ok(format!("{prefix}/{secs:020}"))
}

/// Parse the instant encoded in a key produced by [`time_key`].
pub fn parse_time_key(prefix: &str, key: &str) -> Option<DateTime<Utc>> {
    let suffix = key.strip_prefix(prefix)?.strip_prefix('/')?;
    if suffix.len() != 20 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = suffix.parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
        && !key.contains('\\');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_key_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 4, 2, 9, 15, 0).unwrap();
        let key = time_key("measurements", ts).unwrap();
        assert_eq!(key, "measurements/00000000001712049300");
        assert_eq!(parse_time_key("measurements", &key), Some(ts));
    }

    #[test]
    fn test_time_key_rejects_pre_epoch() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap();
        assert!(matches!(
            time_key("measurements", ts),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_parse_time_key_rejects_foreign_keys() {
        assert_eq!(parse_time_key("measurements", "model/current"), None);
        assert_eq!(parse_time_key("measurements", "measurements/abc"), None);
        assert_eq!(parse_time_key("weather", "measurements/00000000001712049300"), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("model/current").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("../etc/passwd").is_err());
    }
}
