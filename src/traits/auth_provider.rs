//! Identity provider trait abstraction.
//!
//! The session core never talks to an identity provider directly. It consumes
//! this trait, which production code implements over HTTP and tests implement
//! with [`MockAuthProvider`](crate::adapters::mock::MockAuthProvider).

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::auth::{Credential, SignInInput};
use crate::error::AuthError;

/// Push notification from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    /// A principal signed in and a fresh credential was issued.
    SignedIn(Credential),
    /// The provider rotated the credential on its own.
    TokenRefreshed(Credential),
    /// Principal details changed; the credential is re-issued with them.
    PrincipalUpdated(Credential),
    /// The session ended, locally or remotely.
    SignedOut,
}

impl CredentialEvent {
    /// The credential carried by the event, `None` for sign-out.
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            CredentialEvent::SignedIn(c)
            | CredentialEvent::TokenRefreshed(c)
            | CredentialEvent::PrincipalUpdated(c) => Some(c),
            CredentialEvent::SignedOut => None,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            CredentialEvent::SignedIn(_) => "signed_in",
            CredentialEvent::TokenRefreshed(_) => "token_refreshed",
            CredentialEvent::PrincipalUpdated(_) => "principal_updated",
            CredentialEvent::SignedOut => "signed_out",
        }
    }
}

/// Trait for identity provider operations.
///
/// Errors must be classifiable: transient failures are
/// [`AuthError::Network`], rejections are [`AuthError::Authentication`].
/// [`AuthError::from_status`] does the mapping for status-code based providers.
///
/// # Example
///
/// ```ignore
/// use session_core::traits::AuthProviderClient;
///
/// async fn whoami<P: AuthProviderClient>(provider: &P) -> Option<String> {
///     let credential = provider.current_credential().await.ok()??;
///     Some(credential.principal().id().to_string())
/// }
/// ```
#[async_trait]
pub trait AuthProviderClient: Send + Sync {
    /// Whether the provider has what it needs to make calls at all.
    fn is_configured(&self) -> bool;

    /// The credential the provider currently holds, if any.
    async fn current_credential(&self) -> Result<Option<Credential>, AuthError>;

    /// Exchange sign-in input for a new credential.
    async fn sign_in(&self, input: &SignInInput) -> Result<Credential, AuthError>;

    /// Exchange the credential's refresh token for a new credential.
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;

    /// End the session with the provider.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Subscribe to credential change events.
    ///
    /// Every call returns an independent receiver. Dropping it unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<CredentialEvent>;
}
