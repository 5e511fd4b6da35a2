//! Programmer and configuration errors.
//!
//! Expected runtime failures (expired tokens, revoked refresh tokens, network
//! blips) are [`AuthError`](super::AuthError) values carried in results. The
//! errors here mean the caller handed the crate something malformed.

use thiserror::Error;

use crate::traits::StorageError;

/// Errors raised for invalid arguments or configuration.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Retry options that cannot describe a bounded backoff.
    #[error("invalid retry options: {reason}")]
    InvalidRetryOptions { reason: String },

    /// An environment or config value could not be parsed.
    #[error("invalid configuration value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },

    /// Secure storage failed while the caller asked for it directly.
    #[error("credential storage error: {0}")]
    Storage(#[from] StorageError),

    /// The HTTP client could not be built (TLS backend, invalid settings).
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Type alias for Results using [`SessionError`].
pub type SessionResult<T> = Result<T, SessionError>;
