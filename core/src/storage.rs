//! Device-local persistent key-value storage for session credentials.
//!
//! The gateway only reads from the store. Session flows (login, password
//! set, logout) are the writers.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

/// Storage keys used by the app.
pub struct StorageKeys;

impl StorageKeys {
    /// Session token written by login and password-set flows.
    pub const SESSION_TOKEN: &'static str = "jwtToken";

    /// Older session token key, read only when falling back to the LAN address.
    pub const LEGACY_SESSION_TOKEN: &'static str = "authToken";
}

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Async key-value store holding string values.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Returns whether the key existed.
    async fn remove(&self, key: &str) -> StorageResult<bool>;
}

/// In-memory store. Values are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        store
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(data.remove(key).is_some())
    }
}

/// Store backed by a single JSON object on disk.
///
/// A missing file reads as an empty store. Writes go to a sibling temp file
/// that is then renamed over the original.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StorageError::Encoding(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec_pretty(data).map_err(|e| StorageError::Encoding(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load().await?;
        data.insert(key.to_string(), value.to_string());
        self.save(&data).await
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load().await?;
        let existed = data.remove(key).is_some();
        if existed {
            self.save(&data).await?;
        }
        Ok(existed)
    }
}
