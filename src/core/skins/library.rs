// ─── Local skin library ───
// User-curated collection of reusable skin files, independent of accounts.
// Files live in a crate-owned directory; metadata goes through the storage
// seam with the same persist-then-commit contract as the account store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::{CoreError, CoreResult};
use crate::core::skins::{LibraryItem, SkinVariant};
use crate::core::storage::Storage;

const STORAGE_KEY: &str = "skin_library";

pub struct SkinLibrary {
    storage: Arc<dyn Storage>,
    /// Directory owning the copied skin files.
    dir: PathBuf,
    items: Mutex<Vec<LibraryItem>>,
}

impl SkinLibrary {
    /// Default file directory under the platform data dir.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("LauncherCore")
            .join("skins")
    }

    pub async fn load(storage: Arc<dyn Storage>, dir: PathBuf) -> CoreResult<Self> {
        let items: Vec<LibraryItem> = match storage.load(STORAGE_KEY).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        info!("Loaded {} skin(s) in the local library", items.len());
        Ok(Self {
            storage,
            dir,
            items: Mutex::new(items),
        })
    }

    pub async fn list(&self) -> Vec<LibraryItem> {
        self.items.lock().await.clone()
    }

    /// Copy `source` into the library directory and persist the entry.
    /// Names may collide; ids are unique.
    pub async fn save(
        &self,
        name: &str,
        source: &Path,
        variant: SkinVariant,
    ) -> CoreResult<LibraryItem> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("skin name must not be empty".into()));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CoreError::Io {
                path: self.dir.clone(),
                source: e,
            })?;

        let id = Uuid::new_v4().to_string();
        let stored_file = self.dir.join(format!("{id}.png"));
        tokio::fs::copy(source, &stored_file)
            .await
            .map_err(|e| CoreError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;

        let item = LibraryItem {
            id,
            name: name.to_string(),
            variant,
            stored_file: stored_file.clone(),
            created_at: Utc::now(),
        };

        let mut items = self.items.lock().await;
        let mut candidate = items.clone();
        candidate.push(item.clone());
        if let Err(e) = self.persist(&candidate).await {
            // Roll the copied file back so a failed save leaves no orphan.
            let _ = tokio::fs::remove_file(&stored_file).await;
            return Err(e);
        }
        *items = candidate;

        info!("Saved skin '{}' to the library", item.name);
        Ok(item)
    }

    /// Delete an entry by id. The stored file is removed best-effort after
    /// the metadata commit succeeds.
    pub async fn delete(&self, id: &str) -> CoreResult<()> {
        let mut items = self.items.lock().await;
        let Some(position) = items.iter().position(|item| item.id == id) else {
            return Err(CoreError::NotFound(format!("library skin '{id}'")));
        };

        let mut candidate = items.clone();
        let removed = candidate.remove(position);
        self.persist(&candidate).await?;
        *items = candidate;

        if let Err(e) = tokio::fs::remove_file(&removed.stored_file).await {
            warn!(
                "Could not remove stored skin file {:?}: {}",
                removed.stored_file, e
            );
        }
        Ok(())
    }

    async fn persist(&self, items: &[LibraryItem]) -> CoreResult<()> {
        self.storage
            .persist(STORAGE_KEY, serde_json::to_value(items)?)
            .await
    }
}
