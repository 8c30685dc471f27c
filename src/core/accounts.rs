// ─── Account store ───
// The set of known accounts plus the active pointer. Every mutation is
// persisted through the storage seam before it becomes visible in memory,
// so a storage failure leaves the store exactly as it was.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::core::auth::Account;
use crate::core::error::{CoreError, CoreResult};
use crate::core::events::{CoreEvent, EventBus};
use crate::core::storage::Storage;

const STORAGE_KEY: &str = "accounts";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedAccounts {
    accounts: Vec<Account>,
    /// Username of the active account; must name an entry in `accounts`.
    active: Option<String>,
}

pub struct AccountStore {
    storage: Arc<dyn Storage>,
    events: EventBus,
    inner: Mutex<PersistedAccounts>,
}

impl AccountStore {
    /// Restore the persisted account set; an absent key yields an empty store.
    pub async fn load(storage: Arc<dyn Storage>, events: EventBus) -> CoreResult<Self> {
        let inner = match storage.load(STORAGE_KEY).await? {
            Some(value) => {
                let mut persisted: PersistedAccounts = serde_json::from_value(value)?;
                // A stale active pointer must never survive a restart.
                if let Some(active) = &persisted.active {
                    if !persisted.accounts.iter().any(|a| &a.username == active) {
                        persisted.active = None;
                    }
                }
                persisted
            }
            None => PersistedAccounts::default(),
        };

        info!("Loaded {} account(s)", inner.accounts.len());
        Ok(Self {
            storage,
            events,
            inner: Mutex::new(inner),
        })
    }

    /// Insertion-ordered list of all known accounts.
    pub async fn list(&self) -> Vec<Account> {
        self.inner.lock().await.accounts.clone()
    }

    pub async fn active(&self) -> Option<Account> {
        let inner = self.inner.lock().await;
        let active = inner.active.as_ref()?;
        inner
            .accounts
            .iter()
            .find(|a| &a.username == active)
            .cloned()
    }

    /// Add an account. When no account is active the new one becomes active,
    /// which covers both the very first add and an add after the active
    /// account was removed.
    pub async fn add_account(&self, account: Account) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .accounts
            .iter()
            .any(|a| a.username == account.username)
        {
            return Err(CoreError::DuplicateUsername(account.username));
        }

        let mut candidate = inner.clone();
        let becomes_active = candidate.active.is_none();
        if becomes_active {
            candidate.active = Some(account.username.clone());
        }
        candidate.accounts.push(account.clone());

        self.commit(&mut inner, candidate).await?;

        info!("Added account '{}'", account.username);
        self.events.emit(CoreEvent::AccountsChanged);
        if becomes_active {
            self.events
                .emit(CoreEvent::ActiveAccountChanged(Some(account.username)));
        }
        Ok(())
    }

    /// Remove an account. If it was active the pointer becomes empty; the
    /// caller decides whether to activate another account afterwards.
    pub async fn remove_account(&self, username: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.accounts.iter().any(|a| a.username == username) {
            return Err(CoreError::NotFound(format!("account '{username}'")));
        }

        let mut candidate = inner.clone();
        candidate.accounts.retain(|a| a.username != username);
        let was_active = candidate.active.as_deref() == Some(username);
        if was_active {
            candidate.active = None;
        }

        self.commit(&mut inner, candidate).await?;

        info!("Removed account '{}'", username);
        self.events.emit(CoreEvent::AccountsChanged);
        if was_active {
            self.events.emit(CoreEvent::ActiveAccountChanged(None));
        }
        Ok(())
    }

    /// Point the active pointer at an existing account.
    pub async fn switch_active(&self, username: &str) -> CoreResult<Account> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .accounts
            .iter()
            .find(|a| a.username == username)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("account '{username}'")))?;

        let mut candidate = inner.clone();
        candidate.active = Some(username.to_string());

        self.commit(&mut inner, candidate).await?;

        info!("Switched active account to '{}'", username);
        self.events
            .emit(CoreEvent::ActiveAccountChanged(Some(username.to_string())));
        Ok(account)
    }

    /// Replace a stored account in place after a re-login refreshed its
    /// session token. No-op error if the username is unknown.
    pub async fn update_account(&self, account: Account) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        let mut candidate = inner.clone();
        let slot = candidate
            .accounts
            .iter_mut()
            .find(|a| a.username == account.username)
            .ok_or_else(|| CoreError::NotFound(format!("account '{}'", account.username)))?;
        *slot = account;

        self.commit(&mut inner, candidate).await?;
        self.events.emit(CoreEvent::AccountsChanged);
        Ok(())
    }

    /// Persist `candidate`, then make it the in-memory state. On storage
    /// failure the previous state stays untouched.
    async fn commit(
        &self,
        inner: &mut PersistedAccounts,
        candidate: PersistedAccounts,
    ) -> CoreResult<()> {
        self.storage
            .persist(STORAGE_KEY, serde_json::to_value(&candidate)?)
            .await?;
        *inner = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryStorage;

    async fn empty_store() -> (Arc<MemoryStorage>, AccountStore) {
        let storage = MemoryStorage::new();
        let store = AccountStore::load(storage.clone(), EventBus::default())
            .await
            .unwrap();
        (storage, store)
    }

    #[tokio::test]
    async fn first_account_becomes_active() {
        let (_, store) = empty_store().await;
        store.add_account(Account::offline("Steve")).await.unwrap();
        store.add_account(Account::offline("Alex")).await.unwrap();

        assert_eq!(store.active().await.unwrap().username, "Steve");
        let names: Vec<_> = store.list().await.into_iter().map(|a| a.username).collect();
        assert_eq!(names, ["Steve", "Alex"]);
    }

    #[tokio::test]
    async fn duplicate_username_leaves_store_unchanged() {
        let (_, store) = empty_store().await;
        store.add_account(Account::offline("Steve")).await.unwrap();

        let result = store
            .add_account(Account::microsoft(
                "Steve".into(),
                "uuid".into(),
                "token".into(),
            ))
            .await;
        assert!(matches!(result, Err(CoreError::DuplicateUsername(_))));
        assert_eq!(store.list().await.len(), 1);
        assert!(!store.list().await[0].is_logged_in());
    }

    #[tokio::test]
    async fn removing_active_account_empties_the_pointer() {
        let (_, store) = empty_store().await;
        store.add_account(Account::offline("Steve")).await.unwrap();
        store.add_account(Account::offline("Alex")).await.unwrap();

        store.remove_account("Steve").await.unwrap();
        assert!(store.active().await.is_none());

        // Caller chooses the fallback explicitly.
        store.switch_active("Alex").await.unwrap();
        assert_eq!(store.active().await.unwrap().username, "Alex");
    }

    #[tokio::test]
    async fn adding_while_no_account_is_active_activates_the_new_one() {
        let (_, store) = empty_store().await;
        store.add_account(Account::offline("Steve")).await.unwrap();
        store.add_account(Account::offline("Alex")).await.unwrap();
        store.remove_account("Steve").await.unwrap();
        assert!(store.active().await.is_none());

        store.add_account(Account::offline("Bob")).await.unwrap();
        assert_eq!(store.active().await.unwrap().username, "Bob");

        // An occupied pointer is left alone by later adds.
        store.add_account(Account::offline("Eve")).await.unwrap();
        assert_eq!(store.active().await.unwrap().username, "Bob");
    }

    #[tokio::test]
    async fn remove_and_switch_report_not_found() {
        let (_, store) = empty_store().await;
        assert!(matches!(
            store.remove_account("Nobody").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.switch_active("Nobody").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn storage_failure_aborts_the_mutation() {
        let (storage, store) = empty_store().await;
        store.add_account(Account::offline("Steve")).await.unwrap();

        storage.set_fail_persist(true);
        let result = store.add_account(Account::offline("Alex")).await;
        assert!(matches!(result, Err(CoreError::Storage { .. })));

        // In-memory state is exactly as before the failed call.
        assert_eq!(store.list().await.len(), 1);
        assert_eq!(store.active().await.unwrap().username, "Steve");

        storage.set_fail_persist(false);
        store.add_account(Account::offline("Alex")).await.unwrap();
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn switch_emits_active_account_changed() {
        let storage = MemoryStorage::new();
        let events = EventBus::default();
        let store = AccountStore::load(storage, events.clone()).await.unwrap();
        store.add_account(Account::offline("Steve")).await.unwrap();
        store.add_account(Account::offline("Alex")).await.unwrap();

        let mut rx = events.subscribe();
        store.switch_active("Alex").await.unwrap();
        let mut saw_switch = false;
        while let Ok(event) = rx.try_recv() {
            if event == CoreEvent::ActiveAccountChanged(Some("Alex".into())) {
                saw_switch = true;
            }
        }
        assert!(saw_switch);
    }

    #[tokio::test]
    async fn reload_restores_accounts_and_drops_stale_pointer() {
        let storage = MemoryStorage::new();
        {
            let store = AccountStore::load(storage.clone(), EventBus::default())
                .await
                .unwrap();
            store.add_account(Account::offline("Steve")).await.unwrap();
        }

        let reloaded = AccountStore::load(storage.clone(), EventBus::default())
            .await
            .unwrap();
        assert_eq!(reloaded.list().await.len(), 1);
        assert_eq!(reloaded.active().await.unwrap().username, "Steve");

        // Corrupt the pointer on disk; load must not resurrect it.
        storage
            .persist(
                STORAGE_KEY,
                serde_json::json!({"accounts": [], "active": "Ghost"}),
            )
            .await
            .unwrap();
        let reloaded = AccountStore::load(storage, EventBus::default())
            .await
            .unwrap();
        assert!(reloaded.active().await.is_none());
    }
}
