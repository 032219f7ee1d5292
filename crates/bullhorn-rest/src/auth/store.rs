//! Session data stores
//!
//! A data store is a flat string key/value surface where the session manager
//! keeps the REST token, REST URL and refresh token. Keys are templated by
//! client id, so one store can hold sessions for several clients.

use super::types::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Default path of the local session file
pub const DEFAULT_STORE_PATH: &str = "./bullhorn-auth-store.json";

/// Persistence for session artifacts
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Store a value, replacing any previous one
    async fn store(&self, key: &str, value: &str) -> AuthResult<()>;

    /// Read a value, `None` if the key was never stored
    async fn get(&self, key: &str) -> AuthResult<Option<String>>;
}

/// In-process store.
///
/// Clones share the same underlying map, which lets several clients reuse one
/// session. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataStore {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn store(&self, key: &str, value: &str) -> AuthResult<()> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.data.read().await.get(key).cloned())
    }
}

/// On-disk document layout: `{"tokens": {"<key>": "<value>"}}`
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    tokens: HashMap<String, String>,
}

/// Store persisted as a JSON file.
///
/// Every write rewrites the whole document. Writes from this process are
/// serialized; concurrent writers in other processes are not coordinated.
#[derive(Debug)]
pub struct LocalFileDataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Default for LocalFileDataStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

impl LocalFileDataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> AuthResult<StoreDocument> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(
                "Session store not found at {}, starting empty",
                self.path.display()
            );
            return Ok(StoreDocument::default());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            AuthError::StorageError(format!(
                "Failed to parse session store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn write_document(&self, document: &StoreDocument) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl DataStore for LocalFileDataStore {
    async fn store(&self, key: &str, value: &str) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        document.tokens.insert(key.to_string(), value.to_string());
        self.write_document(&document).await
    }

    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.read_document().await?.tokens.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryDataStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.store("key", "one").await.unwrap();
        store.store("key", "two").await.unwrap();
        assert_eq!(store.get("key").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_data() {
        let store = MemoryDataStore::new();
        let shared = store.clone();

        store.store("client-rest-token", "abc").await.unwrap();
        assert_eq!(
            shared.get("client-rest-token").await.unwrap().as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn test_file_store_missing_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileDataStore::new(dir.path().join("store.json"));

        assert_eq!(store.get("anything").await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let first = LocalFileDataStore::new(&path);
        first.store("a-rest-token", "token").await.unwrap();
        first.store("a-rest-url", "https://rest.example.com/").await.unwrap();

        let second = LocalFileDataStore::new(&path);
        assert_eq!(
            second.get("a-rest-token").await.unwrap().as_deref(),
            Some("token")
        );
        assert_eq!(
            second.get("a-rest-url").await.unwrap().as_deref(),
            Some("https://rest.example.com/")
        );

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["tokens"]["a-rest-token"], "token");
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        let store = LocalFileDataStore::new(&path);
        assert!(matches!(
            store.get("key").await,
            Err(AuthError::StorageError(_))
        ));
    }
}
