// ─── Microsoft identity provider ───
// Real implementation of the device-code contract against the consumer
// Microsoft OAuth endpoints, then the Xbox Live / XSTS / Minecraft token
// chain to end up with a profile-service session.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::auth::{Account, AZURE_CLIENT_ID_FALLBACK};
use crate::core::auth::device_code::{DeviceCodeGrant, IdentityProvider, PollResponse};
use crate::core::error::{CoreError, CoreResult};

const DEVICE_CODE_URL: &str =
    "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode";
const TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const XBL_AUTH_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_AUTH_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const MC_LOGIN_URL: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
const MC_PROFILE_URL: &str = "https://api.minecraftservices.com/minecraft/profile";

const OAUTH_SCOPE: &str = "XboxLive.signin offline_access";
const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

pub struct MicrosoftIdentityProvider {
    client: Client,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XboxTokenResponse {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "DisplayClaims")]
    display_claims: XboxDisplayClaims,
}

#[derive(Debug, Deserialize)]
struct XboxDisplayClaims {
    xui: Vec<XboxUserHash>,
}

#[derive(Debug, Deserialize)]
struct XboxUserHash {
    uhs: String,
}

#[derive(Debug, Deserialize)]
struct MinecraftLoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MinecraftProfileResponse {
    id: String,
    name: String,
}

impl MicrosoftIdentityProvider {
    pub fn new(client: Client) -> Self {
        Self::with_client_id(client, AZURE_CLIENT_ID_FALLBACK)
    }

    pub fn with_client_id(client: Client, client_id: &str) -> Self {
        Self {
            client,
            client_id: client_id.to_string(),
        }
    }

    /// MSA access token → XBL token + user hash.
    async fn authenticate_xbox_live(&self, msa_token: &str) -> CoreResult<XboxTokenResponse> {
        let body = serde_json::json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={msa_token}"),
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
        });
        let response = self
            .client
            .post(XBL_AUTH_URL)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CoreError::Provider(format!("Xbox Live authentication failed: {e}")))?;
        Ok(response.json().await?)
    }

    /// XBL token → XSTS token scoped to the Minecraft services relying party.
    async fn authorize_xsts(&self, xbl_token: &str) -> CoreResult<XboxTokenResponse> {
        let body = serde_json::json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbl_token],
            },
            "RelyingParty": "rp://api.minecraftservices.com/",
            "TokenType": "JWT",
        });
        let response = self
            .client
            .post(XSTS_AUTH_URL)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| {
                // 401 here usually means no Xbox profile / child account.
                CoreError::Provider(format!("XSTS authorization failed: {e}"))
            })?;
        Ok(response.json().await?)
    }

    /// XSTS token + user hash → Minecraft services access token.
    async fn login_minecraft(&self, user_hash: &str, xsts_token: &str) -> CoreResult<String> {
        let body = serde_json::json!({
            "identityToken": format!("XBL3.0 x={user_hash};{xsts_token}"),
        });
        let response: MinecraftLoginResponse = self
            .client
            .post(MC_LOGIN_URL)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CoreError::Provider(format!("Minecraft login failed: {e}")))?
            .json()
            .await?;
        Ok(response.access_token)
    }

    async fn fetch_minecraft_profile(
        &self,
        mc_token: &str,
    ) -> CoreResult<MinecraftProfileResponse> {
        let response = self
            .client
            .get(MC_PROFILE_URL)
            .bearer_auth(mc_token)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| {
                // 404 means the Microsoft account owns no copy of the game.
                CoreError::Provider(format!("No Minecraft profile for this account: {e}"))
            })?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl IdentityProvider for MicrosoftIdentityProvider {
    async fn request_device_code(&self) -> CoreResult<DeviceCodeGrant> {
        info!("Requesting Microsoft device code");
        let response: DeviceCodeResponse = self
            .client
            .post(DEVICE_CODE_URL)
            .form(&[("client_id", self.client_id.as_str()), ("scope", OAUTH_SCOPE)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| CoreError::Provider(format!("Device code request failed: {e}")))?
            .json()
            .await?;

        Ok(DeviceCodeGrant {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            interval_seconds: response.interval,
            expires_in_seconds: response.expires_in,
        })
    }

    async fn poll_token(&self, device_code: &str) -> CoreResult<PollResponse> {
        // The token endpoint answers 400 with an `error` field while the
        // grant is pending, so the body is parsed regardless of status.
        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
            ])
            .send()
            .await?
            .json()
            .await?;

        let msa_token = match (response.access_token, response.error.as_deref()) {
            (Some(token), _) => token,
            (None, Some("authorization_pending")) | (None, Some("slow_down")) => {
                debug!("Device-code grant still pending");
                return Ok(PollResponse::Pending);
            }
            (None, Some("expired_token")) => return Ok(PollResponse::Expired),
            (None, Some("authorization_declined")) => return Ok(PollResponse::Denied),
            (None, other) => {
                return Err(CoreError::Provider(
                    response
                        .error_description
                        .unwrap_or_else(|| other.unwrap_or("unknown token error").to_string()),
                ));
            }
        };

        // Browser login finished; walk the rest of the chain.
        let xbl = self.authenticate_xbox_live(&msa_token).await?;
        let user_hash = xbl
            .display_claims
            .xui
            .first()
            .map(|claim| claim.uhs.clone())
            .ok_or_else(|| CoreError::Provider("Xbox response carried no user hash".into()))?;
        let xsts = self.authorize_xsts(&xbl.token).await?;
        let mc_token = self.login_minecraft(&user_hash, &xsts.token).await?;
        let profile = self.fetch_minecraft_profile(&mc_token).await?;

        info!("Authenticated Minecraft profile '{}'", profile.name);
        Ok(PollResponse::Authorized(Account::microsoft(
            profile.name,
            profile.id,
            mc_token,
        )))
    }
}
