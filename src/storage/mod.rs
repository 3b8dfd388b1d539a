//! File storage for uploaded and edited documents
//!
//! Keys are flat file names. The session registry and the HTTP layer only
//! ever see keys; [`FileStorage::path_for`] exposes a filesystem path for
//! backends that have one, so document providers can open files directly.

mod local;
mod memory;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Storage Trait
// ============================================================================

/// Trait for file storage backends
#[async_trait::async_trait]
pub trait FileStorage: Send + Sync {
    /// Every stored key
    async fn list_keys(&self) -> StorageResult<Vec<String>>;

    /// Delete a key. `Ok(false)` when it was already gone.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    async fn exists(&self, key: &str) -> bool;

    /// Last modification time
    async fn modified_time(&self, key: &str) -> StorageResult<DateTime<Utc>>;

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Create or overwrite a key
    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Filesystem path of a key, when the backend is file-based
    fn path_for(&self, key: &str) -> Option<PathBuf>;
}

/// Reject keys that could escape the storage root
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Reduce a client-supplied file name to a safe flat key.
///
/// Directory components are dropped, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9._-]` is removed and leading dots or underscores are
/// trimmed. Returns `None` when nothing usable is left.
pub fn secure_filename(name: &str) -> Option<String> {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_start_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(secure_filename("My Report 2024.pdf").as_deref(), Some("My_Report_2024.pdf"));
        assert_eq!(secure_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(secure_filename("C:\\Users\\me\\cv.pdf").as_deref(), Some("cv.pdf"));
        assert_eq!(secure_filename(".hidden.pdf").as_deref(), Some("hidden.pdf"));
        assert_eq!(secure_filename("résumé.pdf").as_deref(), Some("rsum.pdf"));
        assert_eq!(secure_filename("..."), None);
        assert_eq!(secure_filename(""), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("a.pdf").is_ok());
        assert!(validate_key("edited_a.pdf").is_ok());
        assert!(validate_key("../a.pdf").is_err());
        assert!(validate_key("dir/a.pdf").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("").is_err());
    }
}
