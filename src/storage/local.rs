//! Local filesystem storage

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{validate_key, FileStorage, StorageError, StorageResult};

/// Stores every key as a file directly under one directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) a storage directory
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn not_found(key: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait::async_trait]
impl FileStorage for LocalStorage {
    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn modified_time(&self, key: &str) -> StorageResult<DateTime<Utc>> {
        let path = self.resolve(key)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found(key, e))?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path).await.map_err(|e| not_found(key, e))
    }

    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.resolve(key)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.resolve(key).ok()
    }
}
