use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{parse_time_key, validate_key, BlobStore, StorageError};

/// Process-local blob store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.blobs.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.blobs.read().get(key).cloned())
    }

    fn list_since(&self, prefix: &str, since: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        validate_key(prefix)?;
        let start = format!("{prefix}/");
        let blobs = self.blobs.read();
        Ok(blobs
            .range(start.clone()..)
            .take_while(|(key, _)| key.starts_with(&start))
            .filter(|(key, _)| parse_time_key(prefix, key).is_some_and(|ts| ts >= since))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
