//! Authentication error taxonomy.
//!
//! These are the *expected* failure modes of credential validation and
//! refresh. They travel inside [`ValidationResult`](crate::auth::ValidationResult)
//! and provider results; they are never used for programmer errors.

use thiserror::Error;

use super::category::ErrorCategory;

/// HTTP-equivalent statuses that indicate a transient failure worth retrying.
/// `0` stands for "no response at all" (connection refused, DNS, offline).
pub const RETRYABLE_STATUSES: [u16; 4] = [0, 408, 500, 503];

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "no status".to_string(),
    }
}

/// Authentication-specific error variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The identity provider is not configured. Terminal, never retried.
    #[error("identity provider is not configured")]
    NotConfigured,

    /// The access token expires within the safety buffer (or already has).
    #[error("access token expired or about to expire (expires in {expires_in_secs}s)")]
    Expired { expires_in_secs: i64 },

    /// Transient transport or server failure.
    #[error("network error ({}): {message}", describe_status(.status))]
    Network { status: Option<u16>, message: String },

    /// The provider rejected the credential, e.g. the refresh token was revoked.
    #[error("authentication error ({}): {message}", describe_status(.status))]
    Authentication { status: Option<u16>, message: String },

    /// Unexpected failure inside the provider call.
    #[error("unexpected provider error: {message}")]
    Unknown { message: String },

    /// The refresh was abandoned because the session store was torn down.
    #[error("refresh cancelled")]
    Cancelled,
}

impl AuthError {
    /// Classify a provider status code.
    ///
    /// 0/408/500/503 are network-equivalent and retryable; every other status
    /// is an authentication failure.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if RETRYABLE_STATUSES.contains(&status) {
            AuthError::Network {
                status: Some(status),
                message,
            }
        } else {
            AuthError::Authentication {
                status: Some(status),
                message,
            }
        }
    }

    /// Shorthand for a transport failure with no HTTP response.
    pub fn network(message: impl Into<String>) -> Self {
        AuthError::Network {
            status: Some(0),
            message: message.into(),
        }
    }

    /// Shorthand for a non-retryable rejection such as a revoked refresh token.
    pub fn revoked(message: impl Into<String>) -> Self {
        AuthError::Authentication {
            status: Some(400),
            message: message.into(),
        }
    }

    /// Check if another attempt could succeed.
    ///
    /// `Unknown` reports retryable here; the refresh loop caps it at one retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network { .. } | AuthError::Unknown { .. })
    }

    /// Check if this error might be resolved by re-authenticating.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::Expired { .. } | AuthError::Authentication { .. }
        )
    }

    /// High-level category for handling decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::NotConfigured => ErrorCategory::Configuration,
            AuthError::Expired { .. } | AuthError::Authentication { .. } => ErrorCategory::Auth,
            AuthError::Network { .. } => ErrorCategory::Network,
            AuthError::Unknown { .. } => ErrorCategory::Server,
            AuthError::Cancelled => ErrorCategory::Client,
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NotConfigured => "E_AUTH_NOT_CONFIGURED",
            AuthError::Expired { .. } => "E_AUTH_TOKEN_EXP",
            AuthError::Network { .. } => "E_AUTH_NETWORK",
            AuthError::Authentication { .. } => "E_AUTH_REJECTED",
            AuthError::Unknown { .. } => "E_AUTH_UNKNOWN",
            AuthError::Cancelled => "E_AUTH_CANCELLED",
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::NotConfigured => "Sign-in is not available right now.".to_string(),
            AuthError::Expired { .. } => "Your session has expired. Please sign in again.".to_string(),
            AuthError::Network { .. } => {
                "Could not reach the sign-in service. Check your connection.".to_string()
            }
            AuthError::Authentication { .. } => {
                "Your session could not be renewed. Please sign in again.".to_string()
            }
            AuthError::Unknown { message } => format!("Something went wrong: {}", message),
            AuthError::Cancelled => "The session check was cancelled.".to_string(),
        }
    }
}
