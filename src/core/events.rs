// ─── Change notifications ───
// Components emit; the embedding shell subscribes and re-renders.

use tokio::sync::broadcast;

/// Everything the view layer needs to react to, in one enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// The set of known accounts changed (add/remove).
    AccountsChanged,
    /// The active account pointer moved. `None` means the store is empty
    /// or the previously active account was removed.
    ActiveAccountChanged(Option<String>),
    /// A device-code login finished successfully for this username.
    LoginCompleted(String),
    /// The skin preview URL for the given username changed.
    SkinPreviewChanged { username: String, url: Option<String> },
    /// A background skin operation (upload, reset, refresh) failed.
    /// The optimistic preview, if any, is still in place.
    SkinSyncFailed { username: String, message: String },
    /// An authoritative profile fetch completed for this username.
    ProfileRefreshed(String),
}

/// Thin wrapper around a tokio broadcast channel. Cloneable; every
/// component holds one and fires events as part of its state changes.
/// A send with no live receivers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CoreEvent) {
        // Receivers may all be gone during shutdown; that is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
