//! Secure credential storage trait abstraction.
//!
//! A small async key/value interface, the shape identity provider SDKs expect
//! from a storage adapter, plus the one-shot legacy migration hook.

use async_trait::async_trait;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the operation (locked, missing, simulated failure).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Trait for secure credential storage.
#[async_trait]
pub trait SecureCredentialStore: Send + Sync {
    /// Read a value. `Ok(None)` if the key is absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Move credentials written by older, less protected storage into this
    /// store. Must be idempotent.
    ///
    /// # Returns
    /// The number of entries moved.
    async fn migrate_legacy_storage(&self) -> Result<usize, StorageError>;
}
