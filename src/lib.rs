pub mod core;

pub use crate::core::accounts::AccountStore;
pub use crate::core::auth::{
    Account, AccountMode, AuthConfig, AuthState, DeviceCodeAuthenticator, DeviceCodeSession,
    IdentityProvider, MicrosoftIdentityProvider, PollResponse,
};
pub use crate::core::error::{CoreError, CoreResult};
pub use crate::core::events::{CoreEvent, EventBus};
pub use crate::core::http::build_http_client;
pub use crate::core::skins::{
    LibraryItem, MojangProfileService, Preview, ProfileService, SkinCacheResolver, SkinLibrary,
    SkinProfile, SkinSyncCoordinator, SkinVariant, SyncConfig,
};
pub use crate::core::storage::{JsonFileStorage, MemoryStorage, Storage};

use tracing_subscriber::EnvFilter;

/// Initialize structured logging. The embedding shell calls this once at
/// startup; tests and library consumers may skip it.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,launcher_core=debug")),
        )
        .init();
}
