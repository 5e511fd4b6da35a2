//! In-memory credential store for testing.
//!
//! Stores items in memory, keeps a separate "legacy" map to exercise
//! migration, and can be told to fail any operation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::traits::{SecureCredentialStore, StorageError};

/// In-memory credential store for testing.
///
/// # Example
///
/// ```ignore
/// use session_core::adapters::mock::InMemoryCredentialStore;
/// use session_core::traits::SecureCredentialStore;
///
/// let store = InMemoryCredentialStore::new();
/// store.insert_legacy("auth-token", "{...}");
///
/// assert_eq!(store.migrate_legacy_storage().await?, 1);
/// assert!(store.get_item("auth-token").await?.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    /// Secure items
    items: Arc<Mutex<HashMap<String, String>>>,
    /// Items still sitting in legacy storage
    legacy: Arc<Mutex<HashMap<String, String>>>,
    /// Whether writes should fail
    write_should_fail: Arc<Mutex<bool>>,
    /// Whether migration should fail
    migrate_should_fail: Arc<Mutex<bool>>,
    migrate_calls: Arc<AtomicUsize>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry in legacy storage.
    pub fn insert_legacy(&self, key: &str, value: &str) {
        self.legacy
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    /// Read an item synchronously (for assertions).
    pub fn item(&self, key: &str) -> Option<String> {
        self.items.lock().unwrap().get(key).cloned()
    }

    pub fn legacy_len(&self) -> usize {
        self.legacy.lock().unwrap().len()
    }

    pub fn set_write_should_fail(&self, should_fail: bool) {
        *self.write_should_fail.lock().unwrap() = should_fail;
    }

    pub fn set_migrate_should_fail(&self, should_fail: bool) {
        *self.migrate_should_fail.lock().unwrap() = should_fail;
    }

    pub fn migrate_calls(&self) -> usize {
        self.migrate_calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if *self.write_should_fail.lock().unwrap() {
            return Err(StorageError::Unavailable("Mock write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SecureCredentialStore for InMemoryCredentialStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.item(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.items.lock().unwrap().remove(key);
        Ok(())
    }

    async fn migrate_legacy_storage(&self) -> Result<usize, StorageError> {
        self.migrate_calls.fetch_add(1, Ordering::SeqCst);
        if *self.migrate_should_fail.lock().unwrap() {
            return Err(StorageError::Unavailable("Mock migration failure".to_string()));
        }

        let drained: Vec<(String, String)> = self.legacy.lock().unwrap().drain().collect();
        let moved = drained.len();
        self.items.lock().unwrap().extend(drained);
        Ok(moved)
    }
}
