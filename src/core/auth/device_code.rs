// ─── Device-code login ───
// Drives the OAuth2 device-authorization grant: request a code, show it to
// the user, poll the provider until the browser-side login finishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{info, warn};

use crate::core::auth::Account;
use crate::core::error::{CoreError, CoreResult};
use crate::core::events::{CoreEvent, EventBus};

/// Raw grant as returned by the provider's device-code endpoint.
#[derive(Debug, Clone)]
pub struct DeviceCodeGrant {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub interval_seconds: Option<u64>,
    pub expires_in_seconds: Option<u64>,
}

/// What the shell displays while the user completes the login in a browser.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCodeSession {
    pub user_code: String,
    pub verification_uri: String,
    pub poll_interval_seconds: u64,
    pub expires_at: DateTime<Utc>,
}

/// One poll attempt against the token endpoint.
#[derive(Debug, Clone)]
pub enum PollResponse {
    /// The user has not finished the browser login yet. Not an error.
    Pending,
    Authorized(Account),
    Expired,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Idle,
    Requesting,
    Polling,
    Completed,
    Expired,
    Denied,
    Failed,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn request_device_code(&self) -> CoreResult<DeviceCodeGrant>;
    async fn poll_token(&self, device_code: &str) -> CoreResult<PollResponse>;
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Used when the provider omits its own interval.
    pub default_poll_interval: Duration,
    /// Hard ceiling on a whole login attempt, independent of the expiry the
    /// provider advertises. Protects against a code that never expires.
    pub poll_ceiling: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_poll_interval: Duration::from_secs(5),
            poll_ceiling: Duration::from_secs(5 * 60),
        }
    }
}

/// One in-flight login attempt. Taken out of the authenticator by the
/// polling driver so only one task can ever drive it.
struct Attempt {
    generation: u64,
    device_code: String,
    interval: Duration,
    deadline: Instant,
    cancel_rx: watch::Receiver<bool>,
}

/// State machine: `Idle → Requesting → Polling → {Completed|Expired|Denied|Failed}`.
///
/// At most one device-code session is active per authenticator; starting a
/// new login implicitly cancels the previous one.
pub struct DeviceCodeAuthenticator {
    provider: Arc<dyn IdentityProvider>,
    config: AuthConfig,
    events: EventBus,
    /// (current attempt generation, state). A stale driver whose attempt was
    /// superseded must not write its terminal state over the new attempt's.
    state: std::sync::Mutex<(u64, AuthState)>,
    cancel_tx: std::sync::Mutex<Option<watch::Sender<bool>>>,
    attempt: Mutex<Option<Attempt>>,
}

impl DeviceCodeAuthenticator {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: AuthConfig, events: EventBus) -> Self {
        Self {
            provider,
            config,
            events,
            state: std::sync::Mutex::new((0, AuthState::Idle)),
            cancel_tx: std::sync::Mutex::new(None),
            attempt: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.lock().expect("auth state lock poisoned").1
    }

    /// Unconditional write, bumping the generation. Only `start_login` uses it.
    fn set_state_new_generation(&self, state: AuthState) -> u64 {
        let mut guard = self.state.lock().expect("auth state lock poisoned");
        guard.0 += 1;
        guard.1 = state;
        guard.0
    }

    /// Write only if `generation` still owns the state.
    fn set_state_for(&self, generation: u64, state: AuthState) {
        let mut guard = self.state.lock().expect("auth state lock poisoned");
        if guard.0 == generation {
            guard.1 = state;
        }
    }

    /// Stop the current attempt, if any. The polling loop observes this
    /// within one tick and issues no further requests.
    pub fn cancel(&self) {
        if let Some(tx) = self.cancel_tx.lock().expect("cancel lock poisoned").take() {
            let _ = tx.send(true);
            info!("Device-code login cancelled");
        }
    }

    /// Request a device code and enter `Polling`. Returns the session the
    /// shell must display (user code + verification URL).
    pub async fn start_login(&self) -> CoreResult<DeviceCodeSession> {
        // Supersede any pending attempt before touching provider state.
        self.cancel();
        let generation = self.set_state_new_generation(AuthState::Requesting);

        let grant = match self.provider.request_device_code().await {
            Ok(grant) => grant,
            Err(e) => {
                self.set_state_for(generation, AuthState::Failed);
                return Err(e);
            }
        };

        let interval = grant
            .interval_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_poll_interval);
        let expires_in = grant
            .expires_in_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.config.poll_ceiling);
        let budget = expires_in.min(self.config.poll_ceiling);

        let (tx, rx) = watch::channel(false);
        *self.cancel_tx.lock().expect("cancel lock poisoned") = Some(tx);
        *self.attempt.lock().await = Some(Attempt {
            generation,
            device_code: grant.device_code,
            interval,
            deadline: Instant::now() + budget,
            cancel_rx: rx,
        });

        self.set_state_for(generation, AuthState::Polling);
        info!(
            "Device code issued; user code {} at {}",
            grant.user_code, grant.verification_uri
        );

        Ok(DeviceCodeSession {
            user_code: grant.user_code,
            verification_uri: grant.verification_uri,
            poll_interval_seconds: interval.as_secs(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(budget).unwrap_or(chrono::Duration::zero()),
        })
    }

    /// Drive the polling loop until a terminal state. Pending responses are
    /// absorbed; unexpected provider errors are logged and polling continues;
    /// expiry, denial, cancellation and the ceiling all stop it.
    pub async fn poll_until_complete(&self) -> CoreResult<Account> {
        let Some(mut attempt) = self.attempt.lock().await.take() else {
            return Err(CoreError::Other(
                "no device-code session to poll; call start_login first".into(),
            ));
        };

        loop {
            tokio::select! {
                _ = sleep(attempt.interval) => {}
                _ = attempt.cancel_rx.changed() => {
                    self.set_state_for(attempt.generation, AuthState::Idle);
                    return Err(CoreError::LoginCancelled);
                }
                _ = sleep_until(attempt.deadline) => {
                    warn!("Device-code polling hit the time ceiling");
                    self.set_state_for(attempt.generation, AuthState::Expired);
                    return Err(CoreError::ProviderExpired);
                }
            }

            // The request itself races cancellation and the ceiling too, so a
            // hung provider cannot stall the attempt past its deadline.
            let mut rx = attempt.cancel_rx.clone();
            let outcome = tokio::select! {
                outcome = self.provider.poll_token(&attempt.device_code) => outcome,
                _ = rx.changed() => {
                    self.set_state_for(attempt.generation, AuthState::Idle);
                    return Err(CoreError::LoginCancelled);
                }
                _ = sleep_until(attempt.deadline) => {
                    warn!("Device-code polling hit the time ceiling mid-request");
                    self.set_state_for(attempt.generation, AuthState::Expired);
                    return Err(CoreError::ProviderExpired);
                }
            };

            match outcome {
                Ok(PollResponse::Pending) => continue,
                Ok(PollResponse::Authorized(account)) => {
                    self.set_state_for(attempt.generation, AuthState::Completed);
                    info!("Device-code login completed for {}", account.username);
                    self.events
                        .emit(CoreEvent::LoginCompleted(account.username.clone()));
                    return Ok(account);
                }
                Ok(PollResponse::Expired) => {
                    self.set_state_for(attempt.generation, AuthState::Expired);
                    return Err(CoreError::ProviderExpired);
                }
                Ok(PollResponse::Denied) => {
                    self.set_state_for(attempt.generation, AuthState::Denied);
                    return Err(CoreError::ProviderDenied);
                }
                Err(e) if e.is_terminal_provider_error() => {
                    self.set_state_for(attempt.generation, match e {
                        CoreError::ProviderDenied => AuthState::Denied,
                        _ => AuthState::Expired,
                    });
                    return Err(e);
                }
                Err(e) => {
                    // Transient failures (network blips, 5xx) must not kill
                    // a login the user is in the middle of completing.
                    warn!("Device-code poll attempt failed: {}", e);
                    continue;
                }
            }
        }
    }
}
