// ─── Storage seam ───
// The core never decides persistence format or location; it writes whole
// values under string keys through this trait. Each key must be replaced
// atomically: either the previous value or the new one survives a crash.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::error::{CoreError, CoreResult};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Replace the value stored under `key`, all-or-nothing.
    async fn persist(&self, key: &str, value: serde_json::Value) -> CoreResult<()>;

    /// Load the value stored under `key`, or `None` if absent.
    async fn load(&self, key: &str) -> CoreResult<Option<serde_json::Value>>;

    /// Remove the value stored under `key`. Removing an absent key is fine.
    async fn remove(&self, key: &str) -> CoreResult<()>;
}

/// One pretty-printed JSON file per key inside a root directory.
/// Writes go to a sibling `.tmp` file first and are renamed into place,
/// so a key is never observed half-written.
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> CoreResult<PathBuf> {
        if key.is_empty()
            || key
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(CoreError::Storage {
                key: key.to_string(),
                reason: "invalid storage key".to_string(),
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn persist(&self, key: &str, value: serde_json::Value) -> CoreResult<()> {
        let path = self.path_for(key)?;
        let json = serde_json::to_string_pretty(&value)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| storage_err(key, e))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage_err(key, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage_err(key, e));
        }

        debug!("Persisted storage key '{}'", key);
        Ok(())
    }

    async fn load(&self, key: &str) -> CoreResult<Option<serde_json::Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(key, e)),
        }
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(key, e)),
        }
    }
}

fn storage_err(key: &str, source: std::io::Error) -> CoreError {
    CoreError::Storage {
        key: key.to_string(),
        reason: source.to_string(),
    }
}

/// In-memory storage for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, serde_json::Value>>,
    /// When set, every `persist` fails. Lets tests exercise the
    /// abort-on-storage-failure contract of the stores.
    fail_persist: std::sync::atomic::AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn persist(&self, key: &str, value: serde_json::Value) -> CoreResult<()> {
        if self.fail_persist.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CoreError::Storage {
                key: key.to_string(),
                reason: "simulated storage failure".to_string(),
            });
        }
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> CoreResult<Option<serde_json::Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
