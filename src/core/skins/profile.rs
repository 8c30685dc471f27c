// ─── Remote profile service ───

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::info;

use crate::core::auth::Account;
use crate::core::error::{CoreError, CoreResult};
use crate::core::skins::{SkinProfile, SkinVariant};

const MC_PROFILE_URL: &str = "https://api.minecraftservices.com/minecraft/profile";
const MC_SKIN_UPLOAD_URL: &str = "https://api.minecraftservices.com/minecraft/profile/skins";
const MC_SKIN_RESET_URL: &str =
    "https://api.minecraftservices.com/minecraft/profile/skins/active";

/// Remote writes are accepted asynchronously: an acknowledged upload is not
/// necessarily visible in the next `fetch_profile` yet.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn fetch_profile(&self, account: &Account) -> CoreResult<SkinProfile>;
    async fn upload_skin(
        &self,
        account: &Account,
        file_bytes: Vec<u8>,
        variant: SkinVariant,
    ) -> CoreResult<()>;
    async fn reset_skin(&self, account: &Account) -> CoreResult<()>;
}

pub struct MojangProfileService {
    client: Client,
}

impl MojangProfileService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn session_token(account: &Account) -> CoreResult<&str> {
    account
        .access_token
        .as_deref()
        .filter(|_| account.is_logged_in())
        .ok_or(CoreError::AuthRequired)
}

#[async_trait]
impl ProfileService for MojangProfileService {
    async fn fetch_profile(&self, account: &Account) -> CoreResult<SkinProfile> {
        let token = session_token(account)?;
        let profile: SkinProfile = self
            .client
            .get(MC_PROFILE_URL)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(profile)
    }

    async fn upload_skin(
        &self,
        account: &Account,
        file_bytes: Vec<u8>,
        variant: SkinVariant,
    ) -> CoreResult<()> {
        let token = session_token(account)?;
        let form = Form::new().text("variant", variant.as_str()).part(
            "file",
            Part::bytes(file_bytes)
                .file_name("skin.png")
                .mime_str("image/png")
                .map_err(|e| CoreError::Other(format!("invalid upload mime type: {e}")))?,
        );

        self.client
            .post(MC_SKIN_UPLOAD_URL)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        info!(
            "Uploaded {} skin for '{}'",
            variant.as_str(),
            account.username
        );
        Ok(())
    }

    async fn reset_skin(&self, account: &Account) -> CoreResult<()> {
        let token = session_token(account)?;
        self.client
            .delete(MC_SKIN_RESET_URL)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;

        info!("Reset skin to default for '{}'", account.username);
        Ok(())
    }
}
