use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire reconciliation core.
/// Every module returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Accounts ────────────────────────────────────────
    #[error("An account named '{0}' already exists")]
    DuplicateUsername(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A logged-in Microsoft account is required for this operation")]
    AuthRequired,

    // ── Identity provider ───────────────────────────────
    #[error("The device code expired before the login was completed")]
    ProviderExpired,

    #[error("The login request was denied")]
    ProviderDenied,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("The login attempt was cancelled")]
    LoginCancelled,

    // ── Skin sync ───────────────────────────────────────
    #[error("Skin upload failed: {0}")]
    UploadFailed(String),

    #[error("Profile refresh failed: {0}")]
    RefreshFailed(String),

    // ── Validation ──────────────────────────────────────
    #[error("Invalid input: {0}")]
    Validation(String),

    // ── Storage ─────────────────────────────────────────
    #[error("Storage operation failed for key '{key}': {reason}")]
    Storage { key: String, reason: String },

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<std::io::Error> for CoreError {
    fn from(source: std::io::Error) -> Self {
        CoreError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl CoreError {
    /// True for the two terminal device-code poll outcomes; any other
    /// provider-side failure is transient from the poll loop's perspective.
    pub fn is_terminal_provider_error(&self) -> bool {
        matches!(self, CoreError::ProviderExpired | CoreError::ProviderDenied)
    }
}

// ── Serialization for shell IPC ─────────────────────────
// The embedding shell forwards errors to the UI as plain strings.
impl serde::Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
