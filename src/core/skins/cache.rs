// ─── Skin display-URL resolution ───
// Fallback chain: cache hit → remote URL with cache-bust token → placeholder.
// A key whose remote fetch already failed this session is remembered and
// short-circuited to the placeholder until explicitly invalidated.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::core::auth::Account;

/// Embedded Steve head shown for offline accounts and failed fetches.
pub const DEFAULT_SKIN_PLACEHOLDER: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAgAAAAICAIAAABLbSncAAAARklEQVQI12NgoAbghLD+I4kwBqOjo+O/f/8YGBj+MzD8Z2D4z8Dwnwmq7P9/BoYL5y8g0/8hHP7/x0b/Y2D4D5b5/58ZAME2EVcxlvGVAAAAAElFTkSuQmCC";

const DEFAULT_REMOTE_BASE: &str = "https://minotar.net";

pub struct SkinCacheResolver {
    /// Head-render service base; `None` disables remote resolution entirely.
    remote_base: Option<String>,
    /// Resolved URIs kept for the process lifetime.
    cache: HashMap<String, String>,
    /// Keys whose remote fetch failed; never retried until invalidated.
    known_bad: HashSet<String>,
}

impl Default for SkinCacheResolver {
    fn default() -> Self {
        Self::new(Some(DEFAULT_REMOTE_BASE.to_string()))
    }
}

impl SkinCacheResolver {
    pub fn new(remote_base: Option<String>) -> Self {
        Self {
            remote_base,
            cache: HashMap::new(),
            known_bad: HashSet::new(),
        }
    }

    fn key_for(account: &Account) -> Option<String> {
        if !account.is_logged_in() {
            return None;
        }
        account.uuid.as_ref().map(|uuid| format!("skin:{uuid}"))
    }

    /// Resolve the URL to display for an account's skin. Never touches the
    /// network itself; callers report load failures via `mark_failed`.
    pub fn resolve_display_url(&self, account: &Account, cache_bust: i64) -> String {
        let Some(key) = Self::key_for(account) else {
            return DEFAULT_SKIN_PLACEHOLDER.to_string();
        };

        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        if self.known_bad.contains(&key) {
            return DEFAULT_SKIN_PLACEHOLDER.to_string();
        }

        let Some(base) = &self.remote_base else {
            return DEFAULT_SKIN_PLACEHOLDER.to_string();
        };
        // uuid is present whenever key_for produced a key
        let uuid = account.uuid.as_deref().unwrap_or_default().replace('-', "");
        format!("{base}/helm/{uuid}/64.png?t={cache_bust}")
    }

    /// Record a resolved URI (e.g. bytes fetched once and written locally).
    pub fn store(&mut self, account: &Account, uri: String) {
        if let Some(key) = Self::key_for(account) {
            self.cache.insert(key, uri);
        }
    }

    /// Remember that the remote URL for this account failed to load, so the
    /// placeholder is served for the rest of the session.
    pub fn mark_failed(&mut self, account: &Account) {
        if let Some(key) = Self::key_for(account) {
            debug!("Marking skin fetch as failed for {}", key);
            self.known_bad.insert(key);
        }
    }

    /// Forget both the cached entry and the failure mark. Idempotent; called
    /// after any operation known to change the remote skin.
    pub fn invalidate(&mut self, account: &Account) {
        if let Some(key) = Self::key_for(account) {
            self.cache.remove(&key);
            self.known_bad.remove(&key);
        }
    }
}
