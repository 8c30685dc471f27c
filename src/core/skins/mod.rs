// ─── Skin reconciliation ───
// Everything about the player's visual identity:
//   profile.rs — remote profile service contract + Mojang implementation
//   cache.rs   — display-URL resolution with cache / known-bad fallback
//   sync.rs    — optimistic apply + deferred authoritative reconciliation
//   library.rs — local, account-independent collection of reusable skins

pub mod cache;
pub mod library;
pub mod profile;
pub mod sync;

pub use cache::{SkinCacheResolver, DEFAULT_SKIN_PLACEHOLDER};
pub use library::SkinLibrary;
pub use profile::{MojangProfileService, ProfileService};
pub use sync::{Preview, SkinSyncCoordinator, SyncConfig};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinVariant {
    #[serde(alias = "CLASSIC")]
    Classic,
    #[serde(alias = "SLIM")]
    Slim,
}

impl SkinVariant {
    /// Form value the profile service expects on upload.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinVariant::Classic => "classic",
            SkinVariant::Slim => "slim",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SkinSlotState {
    Active,
    Inactive,
}

/// One skin slot as reported by the remote profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skin {
    pub id: String,
    pub state: SkinSlotState,
    pub url: String,
    pub variant: SkinVariant,
}

/// Authoritative remote profile snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkinProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub skins: Vec<Skin>,
}

impl SkinProfile {
    pub fn active_skin(&self) -> Option<&Skin> {
        self.skins.iter().find(|s| s.state == SkinSlotState::Active)
    }
}

/// A user-curated library entry, independent of any account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub name: String,
    pub variant: SkinVariant,
    pub stored_file: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_deserializes_mojang_shape() {
        let json = r#"{
            "id": "11111111222233334444555555555555",
            "name": "Steve",
            "skins": [
                {
                    "id": "skin-1",
                    "state": "ACTIVE",
                    "url": "http://textures.example/skin-1.png",
                    "variant": "CLASSIC"
                }
            ]
        }"#;
        let profile: SkinProfile = serde_json::from_str(json).unwrap();
        let active = profile.active_skin().unwrap();
        assert_eq!(active.url, "http://textures.example/skin-1.png");
        assert_eq!(active.variant, SkinVariant::Classic);
    }

    #[test]
    fn variant_serializes_lowercase_for_upload() {
        assert_eq!(SkinVariant::Slim.as_str(), "slim");
        assert_eq!(
            serde_json::to_string(&SkinVariant::Classic).unwrap(),
            "\"classic\""
        );
    }
}
