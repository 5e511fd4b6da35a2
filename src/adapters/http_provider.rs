//! HTTP identity provider adapter.
//!
//! Talks to a token-endpoint style auth service:
//!
//! - `POST {base}/token?grant_type=password` - sign in
//! - `POST {base}/token?grant_type=refresh_token` - refresh
//! - `POST {base}/logout` - sign out (bearer access token)
//!
//! Every request carries the `apikey` header. The current credential is
//! persisted through a [`SecureCredentialStore`] and every change is broadcast
//! as a [`CredentialEvent`].

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::SystemClock;
use crate::auth::{Credential, Principal, SignInInput};
use crate::config::ProviderConfig;
use crate::error::{AuthError, SessionResult};
use crate::traits::{AuthProviderClient, Clock, CredentialEvent, SecureCredentialStore};

/// Successful body of both token grants.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Absolute expiry, seconds since epoch
    #[serde(default)]
    expires_at: Option<i64>,
    /// Relative expiry in seconds; used when `expires_at` is absent
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<UserResponse>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Error body. Auth services disagree on the field name.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// JWT claims used as a fallback for expiry and principal id.
#[derive(Debug, Deserialize)]
struct JwtClaims {
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    sub: Option<String>,
}

/// Decode the (unverified) claims of a JWT access token.
///
/// Returns None if the token is not a JWT or the payload is not JSON.
fn jwt_claims(access_token: &str) -> Option<JwtClaims> {
    let payload = access_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

impl TokenResponse {
    fn into_credential(self, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let claims = jwt_claims(&self.access_token);

        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)))
            .or_else(|| {
                claims
                    .as_ref()
                    .and_then(|c| c.exp)
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
            });

        let principal = match self.user {
            Some(user) => {
                let mut principal = Principal::new(user.id);
                if let Some(email) = user.email {
                    principal = principal.with_email(email);
                }
                if let Some(name) = user.user_metadata.full_name.or(user.user_metadata.name) {
                    principal = principal.with_display_name(name);
                }
                principal
            }
            None => match claims.and_then(|c| c.sub) {
                Some(sub) => Principal::new(sub),
                None => {
                    return Err(AuthError::Unknown {
                        message: "token response carried no user".to_string(),
                    })
                }
            },
        };

        Ok(Credential::new(
            self.access_token,
            self.refresh_token,
            expires_at,
            principal,
        ))
    }
}

/// Map a non-success response to an [`AuthError`].
async fn error_from_response(response: Response) -> AuthError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .error_description
        .or(body.msg)
        .or(body.message)
        .or(body.error)
        .unwrap_or_else(|| {
            if text.is_empty() {
                "Unknown error".to_string()
            } else {
                text
            }
        });
    AuthError::from_status(status, message)
}

/// HTTP implementation of [`AuthProviderClient`].
pub struct HttpAuthProvider {
    config: ProviderConfig,
    client: Client,
    storage: Arc<dyn SecureCredentialStore>,
    clock: Arc<dyn Clock>,
    events_tx: broadcast::Sender<CredentialEvent>,
}

impl HttpAuthProvider {
    /// Create a provider persisting through `storage`.
    ///
    /// # Errors
    /// [`SessionError::HttpClient`](crate::error::SessionError::HttpClient) if
    /// the HTTP client cannot be built.
    pub fn new(config: ProviderConfig, storage: Arc<dyn SecureCredentialStore>) -> SessionResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            config,
            client,
            storage,
            clock: Arc::new(SystemClock),
            events_tx,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Credential, AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        let response = self
            .client
            .post(self.endpoint("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let data: TokenResponse = response.json().await.map_err(|e| AuthError::Unknown {
            message: format!("invalid token response: {}", e),
        })?;
        data.into_credential(self.clock.now())
    }

    /// Store the credential. A storage failure does not fail the grant.
    async fn persist(&self, credential: &Credential) {
        let payload = match serde_json::to_string(credential) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize credential: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set_item(&self.config.storage_key, &payload).await {
            warn!("Failed to persist credential: {}", e);
        }
    }

    fn emit(&self, event: CredentialEvent) {
        debug!(event = event.name(), "Emitting credential event");
        // Ignore send errors (no subscribers)
        let _ = self.events_tx.send(event);
    }
}

impl std::fmt::Debug for HttpAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthProvider")
            .field("base_url", &self.config.base_url)
            .field("storage_key", &self.config.storage_key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthProviderClient for HttpAuthProvider {
    fn is_configured(&self) -> bool {
        self.config.is_complete()
    }

    async fn current_credential(&self) -> Result<Option<Credential>, AuthError> {
        let stored = self
            .storage
            .get_item(&self.config.storage_key)
            .await
            .map_err(|e| AuthError::Unknown {
                message: format!("credential storage unavailable: {}", e),
            })?;

        let Some(payload) = stored else {
            return Ok(None);
        };

        match serde_json::from_str::<Credential>(&payload) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!("Discarding unreadable stored credential: {}", e);
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, input: &SignInInput) -> Result<Credential, AuthError> {
        let body = match input {
            SignInInput::Password { email, password } => serde_json::json!({
                "email": email,
                "password": password,
            }),
        };

        let credential = self.token_grant("password", body).await?;
        self.persist(&credential).await;
        info!(principal_id = credential.principal().id(), "Signed in");
        self.emit(CredentialEvent::SignedIn(credential.clone()));
        Ok(credential)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let body = serde_json::json!({
            "refresh_token": credential.refresh_token(),
        });

        let fresh = self.token_grant("refresh_token", body).await?;
        self.persist(&fresh).await;
        self.emit(CredentialEvent::TokenRefreshed(fresh.clone()));
        Ok(fresh)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let current = self.current_credential().await.ok().flatten();

        let remote = match (&current, self.is_configured()) {
            (Some(credential), true) => {
                let response = self
                    .client
                    .post(self.endpoint("logout"))
                    .header("apikey", &self.config.api_key)
                    .bearer_auth(credential.access_token())
                    .send()
                    .await;
                match response {
                    Ok(response) if response.status().is_success() => Ok(()),
                    Ok(response) => Err(error_from_response(response).await),
                    Err(e) => Err(AuthError::network(e.to_string())),
                }
            }
            _ => Ok(()),
        };

        // Local state is cleared even when the remote call failed.
        if let Err(e) = self.storage.remove_item(&self.config.storage_key).await {
            warn!("Failed to remove stored credential: {}", e);
        }
        self.emit(CredentialEvent::SignedOut);

        remote
    }

    fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events_tx.subscribe()
    }
}
