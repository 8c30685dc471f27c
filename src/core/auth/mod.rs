pub mod device_code;
pub mod microsoft;

pub use device_code::{
    AuthConfig, AuthState, DeviceCodeAuthenticator, DeviceCodeGrant, DeviceCodeSession,
    IdentityProvider, PollResponse,
};
pub use microsoft::MicrosoftIdentityProvider;

use serde::{Deserialize, Serialize};

/// Public client id used when the embedding shell does not register its own
/// Azure application.
pub const AZURE_CLIENT_ID_FALLBACK: &str = "00000000402B5328";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountMode {
    Offline,
    Microsoft,
}

/// A known account. Identity key is `username`; `uuid` and `access_token`
/// are only present for Microsoft accounts that completed a login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub mode: AccountMode,
    pub username: String,
    pub uuid: Option<String>,
    /// Opaque session token for the profile service. Valid for the current
    /// session only; never refreshed by this core.
    pub access_token: Option<String>,
}

impl Account {
    pub fn offline(username: &str) -> Self {
        let trimmed = username.trim();
        Self {
            mode: AccountMode::Offline,
            username: if trimmed.is_empty() {
                "Player".into()
            } else {
                trimmed.into()
            },
            uuid: None,
            access_token: None,
        }
    }

    pub fn microsoft(username: String, uuid: String, access_token: String) -> Self {
        Self {
            mode: AccountMode::Microsoft,
            username,
            uuid: Some(uuid),
            access_token: Some(access_token),
        }
    }

    /// A logged-in account has a Microsoft identity and a live session token.
    pub fn is_logged_in(&self) -> bool {
        self.mode == AccountMode::Microsoft
            && self.uuid.is_some()
            && self.access_token.is_some()
    }
}
