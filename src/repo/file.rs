use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{parse_time_key, validate_key, BlobStore, StorageError};

/// Blob store backed by a directory tree; one file per key.
///
/// Writes go to a temporary sibling which is synced and then renamed over
/// the target, so readers never observe a half-written blob.
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        debug!(root = %root.display(), "opened file blob store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        key: key.to_string(),
        source,
    }
}

impl BlobStore for FileBlobStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.path_of(key);
        let _guard = self.write_lock.lock();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(key))?;
        }
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_error(key))?;
            file.write_all(bytes).map_err(io_error(key))?;
            file.sync_all().map_err(io_error(key))?;
        }
        fs::rename(&tmp, &path).map_err(io_error(key))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        match fs::read(self.path_of(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    fn list_since(&self, prefix: &str, since: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        validate_key(prefix)?;
        let dir = self.path_of(prefix);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(prefix)(e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(prefix))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let key = format!("{prefix}/{name}");
            if parse_time_key(prefix, &key).is_some_and(|ts| ts >= since) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::time_key;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_write_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileBlobStore::open(dir.path()).unwrap();
            store.write("model/current", b"forest").unwrap();
        }
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert_eq!(store.read("model/current").unwrap(), Some(b"forest".to_vec()));
        assert_eq!(store.read("model/missing").unwrap(), None);
    }

    #[test]
    fn test_list_since_skips_temp_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for h in 0..3 {
            let key = time_key("measurements", t0 + Duration::hours(h)).unwrap();
            store.write(&key, b"x").unwrap();
        }
        fs::write(dir.path().join("measurements").join("stray.tmp"), b"x").unwrap();

        let keys = store.list_since("measurements", t0 + Duration::hours(1)).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] < keys[1]);
    }

    #[test]
    fn test_list_since_on_missing_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        let keys = store.list_since("weather", Utc::now()).unwrap();
        assert!(keys.is_empty());
    }
}
