//! In-memory storage

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{validate_key, FileStorage, StorageError, StorageResult};

struct StoredFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Keeps files in a map. Has no filesystem paths.
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, StoredFile>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdate or postdate a stored key
    pub fn set_modified(&self, key: &str, modified: DateTime<Utc>) -> StorageResult<()> {
        let mut files = self.files.lock();
        let file = files
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        file.modified = modified;
        Ok(())
    }
}

#[async_trait::async_trait]
impl FileStorage for MemoryStorage {
    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.files.lock().keys().cloned().collect())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.files.lock().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> bool {
        self.files.lock().contains_key(key)
    }

    async fn modified_time(&self, key: &str) -> StorageResult<DateTime<Utc>> {
        self.files
            .lock()
            .get(key)
            .map(|f| f.modified)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.files
            .lock()
            .get(key)
            .map(|f| f.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.files.lock().insert(
            key.to_string(),
            StoredFile {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn path_for(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}
