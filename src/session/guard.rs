//! Run an operation with a valid session, re-authenticating once on rejection.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, warn};

use super::store::SessionStateStore;
use crate::auth::Credential;
use crate::error::AuthError;

/// Errors that can tell whether the server rejected the credential.
pub trait RequiresReauth {
    fn requires_reauth(&self) -> bool;
}

impl RequiresReauth for AuthError {
    fn requires_reauth(&self) -> bool {
        AuthError::requires_reauth(self)
    }
}

impl RequiresReauth for reqwest::Error {
    fn requires_reauth(&self) -> bool {
        self.status()
            .is_some_and(|status| status == reqwest::StatusCode::UNAUTHORIZED)
    }
}

/// Failure of [`SessionStateStore::with_valid_session`].
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// No valid session could be established. `cause` is `None` when the
    /// store simply had no credential.
    #[error("no valid session")]
    NoSession {
        #[source]
        cause: Option<AuthError>,
    },

    /// The operation itself failed.
    #[error("{0}")]
    Operation(E),
}

impl SessionStateStore {
    /// Run `operation` with a valid credential.
    ///
    /// The session is validated (and refreshed if needed) first. If the
    /// operation fails with an error that [requires re-authentication], the
    /// credential is force-refreshed and the operation retried exactly once.
    /// When that refresh fails the original operation error is returned.
    ///
    /// [requires re-authentication]: RequiresReauth::requires_reauth
    pub async fn with_valid_session<T, E, F, Fut>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RequiresReauth,
    {
        let validation = self.revalidate(false).await;
        let credential = match validation.credential {
            Some(credential) if validation.is_valid => credential,
            _ => {
                return Err(GuardError::NoSession {
                    cause: validation.error,
                })
            }
        };

        let error = match operation(credential).await {
            Ok(value) => return Ok(value),
            Err(error) if error.requires_reauth() => error,
            Err(error) => return Err(GuardError::Operation(error)),
        };

        debug!("Operation rejected the credential, refreshing and retrying once");
        let retry = self.revalidate(true).await;
        match retry.credential {
            Some(credential) if retry.is_valid => {
                operation(credential).await.map_err(GuardError::Operation)
            }
            _ => {
                warn!(
                    code = retry.error.as_ref().map(AuthError::error_code),
                    "Re-authentication failed after rejected operation"
                );
                Err(GuardError::Operation(error))
            }
        }
    }

    /// Like [`with_valid_session`](Self::with_valid_session), but runs
    /// `fallback` instead of failing when there is no valid session.
    ///
    /// The fallback is not used when the operation itself fails, nor when
    /// re-authentication after a rejection fails.
    pub async fn with_valid_session_or<T, E, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, E>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RequiresReauth,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        match self.with_valid_session(operation).await {
            Ok(value) => Ok(value),
            Err(GuardError::NoSession { cause }) => {
                debug!(
                    code = cause.as_ref().map(AuthError::error_code),
                    "No valid session, using fallback"
                );
                fallback().await
            }
            Err(GuardError::Operation(error)) => Err(error),
        }
    }
}
