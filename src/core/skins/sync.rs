// ─── Skin sync coordination ───
// "Apply a skin" is optimistic: the local file is shown immediately, the
// upload runs against the remote profile service, and an authoritative
// re-fetch is deferred because the service propagates writes asynchronously.
// An immediate re-fetch would usually still return the pre-upload state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::auth::Account;
use crate::core::error::{CoreError, CoreResult};
use crate::core::events::{CoreEvent, EventBus};
use crate::core::skins::cache::SkinCacheResolver;
use crate::core::skins::library::SkinLibrary;
use crate::core::skins::profile::ProfileService;
use crate::core::skins::{LibraryItem, SkinProfile, SkinVariant};

/// Displayed skin state for one account.
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    /// What the user just applied locally; shown until the remote catches up.
    Optimistic { url: String, since: DateTime<Utc> },
    /// What the remote profile reports.
    Authoritative(String),
}

impl Preview {
    pub fn url(&self) -> &str {
        match self {
            Preview::Optimistic { url, .. } => url,
            Preview::Authoritative(url) => url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay before the authoritative re-fetch after a fresh upload.
    pub upload_refresh_delay: Duration,
    /// Shorter delay when re-applying an already-known library skin.
    pub library_refresh_delay: Duration,
    /// Delay after a reset to default.
    pub reset_refresh_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            upload_refresh_delay: Duration::from_secs(8),
            library_refresh_delay: Duration::from_secs(3),
            reset_refresh_delay: Duration::from_secs(2),
        }
    }
}

struct SyncInner {
    /// Bumped on every active-account change; a deferred refresh scheduled
    /// under an older epoch is discarded on arrival.
    epoch: u64,
    active_username: Option<String>,
    previews: HashMap<String, Preview>,
    profiles: HashMap<String, SkinProfile>,
}

pub struct SkinSyncCoordinator {
    service: Arc<dyn ProfileService>,
    resolver: Arc<std::sync::Mutex<SkinCacheResolver>>,
    library: Arc<SkinLibrary>,
    events: EventBus,
    config: SyncConfig,
    inner: Arc<Mutex<SyncInner>>,
}

impl SkinSyncCoordinator {
    pub fn new(
        service: Arc<dyn ProfileService>,
        resolver: Arc<std::sync::Mutex<SkinCacheResolver>>,
        library: Arc<SkinLibrary>,
        events: EventBus,
        config: SyncConfig,
    ) -> Self {
        Self {
            service,
            resolver,
            library,
            events,
            config,
            inner: Arc::new(Mutex::new(SyncInner {
                epoch: 0,
                active_username: None,
                previews: HashMap::new(),
                profiles: HashMap::new(),
            })),
        }
    }

    /// Tell the coordinator which account the shell is displaying. Any
    /// deferred refresh scheduled for the previous account becomes stale.
    pub async fn set_active_account(&self, username: Option<String>) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.active_username = username;
    }

    pub async fn preview_for(&self, username: &str) -> Option<Preview> {
        self.inner.lock().await.previews.get(username).cloned()
    }

    pub async fn profile_for(&self, username: &str) -> Option<SkinProfile> {
        self.inner.lock().await.profiles.get(username).cloned()
    }

    /// URL the shell should display right now: the coordinator's preview if
    /// one exists, otherwise the cache resolver's fallback chain.
    pub async fn display_url(&self, account: &Account) -> String {
        if let Some(preview) = self.preview_for(&account.username).await {
            return preview.url().to_string();
        }
        let resolver = self.resolver.lock().expect("resolver lock poisoned");
        resolver.resolve_display_url(account, Utc::now().timestamp_millis())
    }

    /// Apply a locally chosen skin file: optimistic preview first, upload in
    /// the caller's flow, authoritative re-fetch deferred. An upload failure
    /// is surfaced but never rolls the optimistic preview back; the local
    /// file is assumed correct, only the remote record may be stale.
    pub async fn apply_new_skin(
        &self,
        account: &Account,
        file: PathBuf,
        variant: SkinVariant,
    ) -> CoreResult<()> {
        self.apply_file(account, file, variant, self.config.upload_refresh_delay)
            .await
    }

    /// File-picker entry point: a cancelled pick is a no-op, not an error.
    /// Returns whether anything was applied.
    pub async fn apply_picked_file(
        &self,
        account: &Account,
        picked: Option<PathBuf>,
        variant: SkinVariant,
    ) -> CoreResult<bool> {
        match picked {
            Some(file) => {
                self.apply_new_skin(account, file, variant).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-apply a skin from the local library. Same optimistic contract as
    /// `apply_new_skin` with a shorter reconciliation delay.
    pub async fn apply_from_library(
        &self,
        account: &Account,
        item: &LibraryItem,
    ) -> CoreResult<()> {
        self.apply_file(
            account,
            item.stored_file.clone(),
            item.variant,
            self.config.library_refresh_delay,
        )
        .await
    }

    pub async fn save_to_library(
        &self,
        name: &str,
        source: &Path,
        variant: SkinVariant,
    ) -> CoreResult<LibraryItem> {
        self.library.save(name, source, variant).await
    }

    /// Reset the remote skin to default. Clears any optimistic preview and
    /// schedules the usual deferred refresh.
    pub async fn reset_skin(&self, account: &Account) -> CoreResult<()> {
        if !account.is_logged_in() {
            return Err(CoreError::AuthRequired);
        }

        if let Err(e) = self.service.reset_skin(account).await {
            let message = format!("Skin reset failed: {e}");
            self.events.emit(CoreEvent::SkinSyncFailed {
                username: account.username.clone(),
                message: message.clone(),
            });
            return Err(CoreError::UploadFailed(message));
        }

        {
            let mut inner = self.inner.lock().await;
            inner.previews.remove(&account.username);
        }
        self.events.emit(CoreEvent::SkinPreviewChanged {
            username: account.username.clone(),
            url: None,
        });
        self.invalidate_resolver(account);
        self.schedule_refresh(account.clone(), self.config.reset_refresh_delay)
            .await;
        Ok(())
    }

    /// Immediate authoritative fetch (the "Refresh" button). On success the
    /// optimistic preview is replaced by the remote state and the resolver
    /// entry is invalidated so the next resolution uses a fresh token.
    pub async fn refresh_profile(&self, account: &Account) -> CoreResult<SkinProfile> {
        if !account.is_logged_in() {
            return Err(CoreError::AuthRequired);
        }
        let profile = self
            .service
            .fetch_profile(account)
            .await
            .map_err(|e| CoreError::RefreshFailed(e.to_string()))?;

        let mut inner = self.inner.lock().await;
        self.apply_authoritative(&mut inner, account, profile.clone());
        Ok(profile)
    }

    async fn apply_file(
        &self,
        account: &Account,
        file: PathBuf,
        variant: SkinVariant,
        refresh_delay: Duration,
    ) -> CoreResult<()> {
        if !account.is_logged_in() {
            return Err(CoreError::AuthRequired);
        }

        // Optimistic preview first: the UI shows the new skin with zero
        // latency regardless of how the upload goes.
        let optimistic_url = local_file_url(&file);
        {
            let mut inner = self.inner.lock().await;
            inner.previews.insert(
                account.username.clone(),
                Preview::Optimistic {
                    url: optimistic_url.clone(),
                    since: Utc::now(),
                },
            );
        }
        self.events.emit(CoreEvent::SkinPreviewChanged {
            username: account.username.clone(),
            url: Some(optimistic_url),
        });

        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.surface_upload_failure(account, e.to_string())),
        };
        if let Err(e) = self.service.upload_skin(account, bytes, variant).await {
            return Err(self.surface_upload_failure(account, e.to_string()));
        }

        info!(
            "Skin upload accepted for '{}'; scheduling refresh in {:?}",
            account.username, refresh_delay
        );
        self.invalidate_resolver(account);
        self.schedule_refresh(account.clone(), refresh_delay).await;
        Ok(())
    }

    fn surface_upload_failure(&self, account: &Account, message: String) -> CoreError {
        warn!("Skin upload failed for '{}': {}", account.username, message);
        self.events.emit(CoreEvent::SkinSyncFailed {
            username: account.username.clone(),
            message: message.clone(),
        });
        CoreError::UploadFailed(message)
    }

    fn invalidate_resolver(&self, account: &Account) {
        let mut resolver = self.resolver.lock().expect("resolver lock poisoned");
        resolver.invalidate(account);
    }

    /// Fire-and-resume deferred reconciliation. The task captures the epoch
    /// at scheduling time; if the active account changed while it slept or
    /// fetched, its result is discarded instead of overwriting newer state.
    async fn schedule_refresh(&self, account: Account, delay: Duration) {
        let epoch = self.inner.lock().await.epoch;
        let service = self.service.clone();
        let resolver = self.resolver.clone();
        let events = self.events.clone();
        let inner = self.inner.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let still_current = |inner: &SyncInner| {
                inner.epoch == epoch
                    && inner
                        .active_username
                        .as_deref()
                        .map(|active| active == account.username)
                        .unwrap_or(true)
            };

            if !still_current(&*inner.lock().await) {
                debug!(
                    "Discarding stale deferred refresh for '{}'",
                    account.username
                );
                return;
            }

            match service.fetch_profile(&account).await {
                Ok(profile) => {
                    let mut guard = inner.lock().await;
                    // The fetch itself took time; re-check before applying.
                    if !still_current(&guard) {
                        debug!(
                            "Discarding stale deferred refresh for '{}'",
                            account.username
                        );
                        return;
                    }
                    let authoritative_url = profile.active_skin().map(|s| s.url.clone());
                    if let Some(url) = &authoritative_url {
                        guard
                            .previews
                            .insert(account.username.clone(), Preview::Authoritative(url.clone()));
                    } else {
                        guard.previews.remove(&account.username);
                    }
                    guard.profiles.insert(account.username.clone(), profile);
                    drop(guard);

                    {
                        let mut resolver = resolver.lock().expect("resolver lock poisoned");
                        resolver.invalidate(&account);
                    }
                    events.emit(CoreEvent::ProfileRefreshed(account.username.clone()));
                    events.emit(CoreEvent::SkinPreviewChanged {
                        username: account.username.clone(),
                        url: authoritative_url,
                    });
                }
                Err(e) => {
                    // Graceful degradation: the optimistic preview stays.
                    warn!(
                        "Deferred profile refresh failed for '{}': {}",
                        account.username, e
                    );
                    events.emit(CoreEvent::SkinSyncFailed {
                        username: account.username.clone(),
                        message: CoreError::RefreshFailed(e.to_string()).to_string(),
                    });
                }
            }
        });
    }

    /// Shared by the immediate refresh path.
    fn apply_authoritative(
        &self,
        inner: &mut SyncInner,
        account: &Account,
        profile: SkinProfile,
    ) {
        let authoritative_url = profile.active_skin().map(|s| s.url.clone());
        if let Some(url) = &authoritative_url {
            inner
                .previews
                .insert(account.username.clone(), Preview::Authoritative(url.clone()));
        } else {
            inner.previews.remove(&account.username);
        }
        inner.profiles.insert(account.username.clone(), profile);

        {
            let mut resolver = self.resolver.lock().expect("resolver lock poisoned");
            resolver.invalidate(account);
        }
        self.events
            .emit(CoreEvent::ProfileRefreshed(account.username.clone()));
        self.events.emit(CoreEvent::SkinPreviewChanged {
            username: account.username.clone(),
            url: authoritative_url,
        });
    }
}

fn local_file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::skins::{Skin, SkinSlotState};
    use crate::core::storage::MemoryStorage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::sleep;

    struct MockProfileService {
        profile_url: std::sync::Mutex<Option<String>>,
        fail_upload: AtomicBool,
        fail_fetch: AtomicBool,
        uploads: std::sync::Mutex<Vec<SkinVariant>>,
        resets: AtomicBool,
    }

    impl MockProfileService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                profile_url: std::sync::Mutex::new(None),
                fail_upload: AtomicBool::new(false),
                fail_fetch: AtomicBool::new(false),
                uploads: std::sync::Mutex::new(Vec::new()),
                resets: AtomicBool::new(false),
            })
        }

        fn set_remote_skin(&self, url: &str) {
            *self.profile_url.lock().unwrap() = Some(url.to_string());
        }
    }

    #[async_trait::async_trait]
    impl ProfileService for MockProfileService {
        async fn fetch_profile(&self, account: &Account) -> CoreResult<SkinProfile> {
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(CoreError::Other("profile service unavailable".into()));
            }
            let skins = match self.profile_url.lock().unwrap().clone() {
                Some(url) => vec![Skin {
                    id: "skin-1".into(),
                    state: SkinSlotState::Active,
                    url,
                    variant: SkinVariant::Classic,
                }],
                None => Vec::new(),
            };
            Ok(SkinProfile {
                id: account.uuid.clone().unwrap_or_default(),
                name: account.username.clone(),
                skins,
            })
        }

        async fn upload_skin(
            &self,
            _account: &Account,
            _file_bytes: Vec<u8>,
            variant: SkinVariant,
        ) -> CoreResult<()> {
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(CoreError::Other("upload rejected".into()));
            }
            self.uploads.lock().unwrap().push(variant);
            Ok(())
        }

        async fn reset_skin(&self, _account: &Account) -> CoreResult<()> {
            self.resets.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        service: Arc<MockProfileService>,
        coordinator: SkinSyncCoordinator,
        events: EventBus,
        resolver: Arc<std::sync::Mutex<SkinCacheResolver>>,
        skin_file: PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = std::env::temp_dir()
            .join("launcher-core-tests")
            .join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let skin_file = dir.join("skin.png");
        tokio::fs::write(&skin_file, b"fake png bytes").await.unwrap();

        let service = MockProfileService::new();
        let resolver = Arc::new(std::sync::Mutex::new(SkinCacheResolver::default()));
        let library = Arc::new(
            SkinLibrary::load(MemoryStorage::new(), dir.join("library"))
                .await
                .unwrap(),
        );
        let events = EventBus::default();
        let coordinator = SkinSyncCoordinator::new(
            service.clone(),
            resolver.clone(),
            library,
            events.clone(),
            SyncConfig {
                upload_refresh_delay: Duration::from_millis(20),
                library_refresh_delay: Duration::from_millis(10),
                reset_refresh_delay: Duration::from_millis(10),
            },
        );
        Fixture {
            service,
            coordinator,
            events,
            resolver,
            skin_file,
        }
    }

    fn steve() -> Account {
        Account::microsoft(
            "Steve".into(),
            "11111111-2222-3333-4444-555555555555".into(),
            "token".into(),
        )
    }

    #[tokio::test]
    async fn apply_requires_logged_in_account() {
        let fx = fixture().await;
        let result = fx
            .coordinator
            .apply_new_skin(&Account::offline("Steve"), fx.skin_file.clone(), SkinVariant::Classic)
            .await;
        assert!(matches!(result, Err(CoreError::AuthRequired)));
        assert!(fx.coordinator.preview_for("Steve").await.is_none());
        assert!(fx.service.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn optimistic_preview_appears_before_anything_else() {
        let fx = fixture().await;
        let mut rx = fx.events.subscribe();

        fx.coordinator
            .apply_new_skin(&steve(), fx.skin_file.clone(), SkinVariant::Slim)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let expected_url = format!("file://{}", fx.skin_file.display());
        assert_eq!(
            first,
            CoreEvent::SkinPreviewChanged {
                username: "Steve".into(),
                url: Some(expected_url.clone()),
            }
        );
        match fx.coordinator.preview_for("Steve").await.unwrap() {
            Preview::Optimistic { url, .. } => assert_eq!(url, expected_url),
            other => panic!("expected optimistic preview, got {other:?}"),
        }
        assert_eq!(*fx.service.uploads.lock().unwrap(), vec![SkinVariant::Slim]);
    }

    #[tokio::test]
    async fn upload_failure_keeps_the_optimistic_preview() {
        let fx = fixture().await;
        fx.service.fail_upload.store(true, Ordering::SeqCst);
        let mut rx = fx.events.subscribe();

        let result = fx
            .coordinator
            .apply_new_skin(&steve(), fx.skin_file.clone(), SkinVariant::Classic)
            .await;
        assert!(matches!(result, Err(CoreError::UploadFailed(_))));

        // Preview survives the failure.
        assert!(matches!(
            fx.coordinator.preview_for("Steve").await,
            Some(Preview::Optimistic { .. })
        ));

        // Both the preview change and the failure were surfaced.
        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, CoreEvent::SkinSyncFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn deferred_refresh_promotes_the_authoritative_skin() {
        let fx = fixture().await;
        fx.service.set_remote_skin("http://textures.example/new.png");

        fx.coordinator
            .apply_new_skin(&steve(), fx.skin_file.clone(), SkinVariant::Classic)
            .await
            .unwrap();
        assert!(matches!(
            fx.coordinator.preview_for("Steve").await,
            Some(Preview::Optimistic { .. })
        ));

        sleep(Duration::from_millis(80)).await;
        assert_eq!(
            fx.coordinator.preview_for("Steve").await,
            Some(Preview::Authoritative(
                "http://textures.example/new.png".into()
            ))
        );
        assert!(fx.coordinator.profile_for("Steve").await.is_some());
    }

    #[tokio::test]
    async fn failed_deferred_refresh_retains_the_optimistic_preview() {
        let fx = fixture().await;
        fx.service.fail_fetch.store(true, Ordering::SeqCst);
        let mut rx = fx.events.subscribe();

        fx.coordinator
            .apply_new_skin(&steve(), fx.skin_file.clone(), SkinVariant::Classic)
            .await
            .unwrap();
        sleep(Duration::from_millis(80)).await;

        assert!(matches!(
            fx.coordinator.preview_for("Steve").await,
            Some(Preview::Optimistic { .. })
        ));
        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, CoreEvent::SkinSyncFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn account_switch_discards_the_inflight_refresh() {
        let fx = fixture().await;
        fx.service.set_remote_skin("http://textures.example/new.png");

        fx.coordinator
            .set_active_account(Some("Steve".into()))
            .await;
        fx.coordinator
            .apply_new_skin(&steve(), fx.skin_file.clone(), SkinVariant::Classic)
            .await
            .unwrap();

        // User switches away before the deferred refresh fires.
        fx.coordinator.set_active_account(Some("Alex".into())).await;
        sleep(Duration::from_millis(80)).await;

        // The stale result was not applied to anyone's displayed state.
        assert!(matches!(
            fx.coordinator.preview_for("Steve").await,
            Some(Preview::Optimistic { .. })
        ));
        assert!(fx.coordinator.preview_for("Alex").await.is_none());
        assert!(fx.coordinator.profile_for("Steve").await.is_none());
    }

    #[tokio::test]
    async fn cancelled_file_pick_is_a_noop() {
        let fx = fixture().await;
        let applied = fx
            .coordinator
            .apply_picked_file(&steve(), None, SkinVariant::Classic)
            .await
            .unwrap();
        assert!(!applied);
        assert!(fx.coordinator.preview_for("Steve").await.is_none());
        assert!(fx.service.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_from_library_uses_the_stored_file() {
        let fx = fixture().await;
        fx.service.set_remote_skin("http://textures.example/lib.png");
        let item = fx
            .coordinator
            .save_to_library("Red Hoodie", &fx.skin_file, SkinVariant::Slim)
            .await
            .unwrap();

        fx.coordinator
            .apply_from_library(&steve(), &item)
            .await
            .unwrap();
        assert_eq!(*fx.service.uploads.lock().unwrap(), vec![SkinVariant::Slim]);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(
            fx.coordinator.preview_for("Steve").await,
            Some(Preview::Authoritative(
                "http://textures.example/lib.png".into()
            ))
        );
    }

    #[tokio::test]
    async fn reset_clears_the_preview() {
        let fx = fixture().await;
        fx.coordinator
            .apply_new_skin(&steve(), fx.skin_file.clone(), SkinVariant::Classic)
            .await
            .unwrap();

        fx.coordinator.reset_skin(&steve()).await.unwrap();
        assert!(fx.service.resets.load(Ordering::SeqCst));
        assert!(fx.coordinator.preview_for("Steve").await.is_none());

        // Deferred refresh after reset finds no active skin; preview stays empty.
        sleep(Duration::from_millis(60)).await;
        assert!(fx.coordinator.preview_for("Steve").await.is_none());
    }

    #[tokio::test]
    async fn manual_refresh_replaces_the_optimistic_preview_immediately() {
        let fx = fixture().await;
        fx.service.set_remote_skin("http://textures.example/auth.png");
        {
            let mut resolver = fx.resolver.lock().unwrap();
            resolver.store(&steve(), "file:///cache/stale-steve.png".into());
            resolver.mark_failed(&steve());
        }

        fx.coordinator
            .apply_new_skin(&steve(), fx.skin_file.clone(), SkinVariant::Classic)
            .await
            .unwrap();
        let profile = fx.coordinator.refresh_profile(&steve()).await.unwrap();
        assert_eq!(profile.name, "Steve");
        assert_eq!(
            fx.coordinator.preview_for("Steve").await,
            Some(Preview::Authoritative(
                "http://textures.example/auth.png".into()
            ))
        );

        // The refresh dropped both the cached entry and the failure mark, so
        // resolution falls through to the remote URL with a fresh token.
        let resolver = fx.resolver.lock().unwrap();
        let resolved = resolver.resolve_display_url(&steve(), 7);
        assert!(resolved.ends_with("?t=7"));
    }

    #[tokio::test]
    async fn end_to_end_steve_scenario() {
        let fx = fixture().await;
        let offline = Account::offline("Steve");

        // Not logged in: placeholder, regardless of anything else.
        let url = fx.coordinator.display_url(&offline).await;
        assert_eq!(url, crate::core::skins::DEFAULT_SKIN_PLACEHOLDER);

        // Login succeeded elsewhere; the account is now a Microsoft one.
        let account = steve();
        fx.service.set_remote_skin("http://textures.example/steve.png");

        // Apply: preview shows the local file instantly.
        fx.coordinator
            .apply_new_skin(&account, fx.skin_file.clone(), SkinVariant::Classic)
            .await
            .unwrap();
        let url = fx.coordinator.display_url(&account).await;
        assert_eq!(url, format!("file://{}", fx.skin_file.display()));

        // After the deferred delay the authoritative remote skin wins.
        sleep(Duration::from_millis(80)).await;
        let url = fx.coordinator.display_url(&account).await;
        assert_eq!(url, "http://textures.example/steve.png");

        // The resolver was invalidated, so a fresh cache-busting token is
        // used for anyone resolving the remote head render.
        let resolver = fx.resolver.lock().unwrap();
        let resolved = resolver.resolve_display_url(&account, 99);
        assert!(resolved.ends_with("?t=99"));
    }
}
