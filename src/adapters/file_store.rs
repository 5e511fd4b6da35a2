//! File-based secure credential store.
//!
//! Items live in a single JSON object at `~/.session-core/credentials.json`,
//! written with owner-only permissions on Unix. Older releases kept tokens in
//! a world-readable `storage.json` next to it; [`FileCredentialStore`] moves
//! matching keys out of that file on migration.

use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::traits::{SecureCredentialStore, StorageError};

/// The store directory name.
const STORE_DIR: &str = ".session-core";

/// The secure items file name.
const STORE_FILE: &str = "credentials.json";

/// The legacy plaintext storage file name.
const LEGACY_FILE: &str = "storage.json";

/// Anchored key shape that marks a legacy entry for migration.
///
/// A key matches when it starts with `prefix` and, if a suffix is set, ends
/// with it, with the two not overlapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyKeyPattern {
    prefix: Cow<'static, str>,
    suffix: Option<Cow<'static, str>>,
}

impl LegacyKeyPattern {
    /// Keys starting with `prefix`.
    pub const fn prefix(prefix: &'static str) -> Self {
        Self {
            prefix: Cow::Borrowed(prefix),
            suffix: None,
        }
    }

    /// Keys of the form `{prefix}{anything}{suffix}`.
    pub const fn enclosing(prefix: &'static str, suffix: &'static str) -> Self {
        Self {
            prefix: Cow::Borrowed(prefix),
            suffix: Some(Cow::Borrowed(suffix)),
        }
    }

    pub fn new(prefix: impl Into<String>, suffix: Option<String>) -> Self {
        Self {
            prefix: Cow::Owned(prefix.into()),
            suffix: suffix.map(Cow::Owned),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        let Some(rest) = key.strip_prefix(self.prefix.as_ref()) else {
            return false;
        };
        match &self.suffix {
            Some(suffix) => rest.ends_with(suffix.as_ref()),
            None => true,
        }
    }
}

/// Session keys written by earlier auth clients: the session blob, the
/// per-project session, its refresh token and the PKCE code verifier.
pub const DEFAULT_LEGACY_PATTERNS: [LegacyKeyPattern; 4] = [
    LegacyKeyPattern::prefix("supabase.auth.token"),
    LegacyKeyPattern::enclosing("sb-", "-auth-token"),
    LegacyKeyPattern::enclosing("sb-", "-auth.refresh-token"),
    LegacyKeyPattern::enclosing("sb-", "-auth.code_verifier"),
];

type Items = BTreeMap<String, String>;

/// File-based secure credential store.
///
/// # Example
///
/// ```ignore
/// use session_core::adapters::FileCredentialStore;
/// use session_core::traits::SecureCredentialStore;
///
/// let store = FileCredentialStore::new()?;
/// store.migrate_legacy_storage().await?;
/// store.set_item("session-core.auth-token", &payload).await?;
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    legacy_path: Option<PathBuf>,
    legacy_patterns: Vec<LegacyKeyPattern>,
    /// Serializes read-modify-write cycles on the files
    io_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Create a store under the home directory.
    ///
    /// # Returns
    /// The store, or an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, StorageError> {
        let home = dirs::home_dir().ok_or_else(|| {
            StorageError::Unavailable("Failed to determine home directory".to_string())
        })?;
        let dir = home.join(STORE_DIR);
        Ok(Self::with_path(dir.join(STORE_FILE)).with_legacy_path(dir.join(LEGACY_FILE)))
    }

    /// Create a store at an explicit path with no legacy source.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path: None,
            legacy_patterns: DEFAULT_LEGACY_PATTERNS.to_vec(),
            io_lock: Mutex::new(()),
        }
    }

    /// Set the legacy file to migrate from.
    pub fn with_legacy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_path = Some(path.into());
        self
    }

    /// Replace the patterns that mark legacy entries for migration.
    pub fn with_legacy_patterns<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = LegacyKeyPattern>,
    {
        self.legacy_patterns = patterns.into_iter().collect();
        self
    }

    /// Get the path to the secure items file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn legacy_path(&self) -> Option<&Path> {
        self.legacy_path.as_deref()
    }

    fn is_legacy_auth_key(&self, key: &str) -> bool {
        self.legacy_patterns.iter().any(|pattern| pattern.matches(key))
    }
}

fn read_items(path: &Path) -> Result<Items, StorageError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Items::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Write via a sibling temp file and rename, so readers never see half a file.
fn write_items(path: &Path, items: &Items) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let file = options.open(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, items)?;
    writer.flush()?;
    drop(writer);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl SecureCredentialStore for FileCredentialStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.io_lock.lock().await;
        Ok(read_items(&self.path)?.remove(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.io_lock.lock().await;
        let mut items = read_items(&self.path)?;
        items.insert(key.to_string(), value.to_string());
        write_items(&self.path, &items)
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.io_lock.lock().await;
        let mut items = read_items(&self.path)?;
        if items.remove(key).is_some() {
            write_items(&self.path, &items)?;
        }
        Ok(())
    }

    async fn migrate_legacy_storage(&self) -> Result<usize, StorageError> {
        let Some(legacy_path) = self.legacy_path.as_deref() else {
            return Ok(0);
        };

        let _guard = self.io_lock.lock().await;
        let mut legacy = read_items(legacy_path)?;
        let keys: Vec<String> = legacy
            .keys()
            .filter(|key| self.is_legacy_auth_key(key))
            .cloned()
            .collect();

        if keys.is_empty() {
            debug!("No legacy auth entries to migrate");
            return Ok(0);
        }

        let mut items = read_items(&self.path)?;
        let mut migrated = 0;
        for key in &keys {
            if let Some(value) = legacy.remove(key) {
                if value.is_empty() {
                    continue;
                }
                items.insert(key.clone(), value);
                migrated += 1;
                debug!(key = key.as_str(), "Migrated legacy entry");
            }
        }

        // Secure copy first: a crash in between leaves a duplicate, never a loss.
        write_items(&self.path, &items)?;
        if let Err(err) = write_items(legacy_path, &legacy) {
            warn!("Failed to prune legacy storage after migration: {}", err);
            return Err(err);
        }

        info!(migrated, "Migrated legacy auth entries to secure storage");
        Ok(migrated)
    }
}
