//! Credential and principal types.
//!
//! A [`Credential`] is issued by the identity provider on sign-in or refresh and
//! never mutated afterwards: a refresh yields a brand new value.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated identity behind a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

impl Principal {
    /// Create a principal with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// Bearer token pair with expiry, owned by a single principal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    /// `None` when the provider did not report an expiry.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    expires_at: Option<DateTime<Utc>>,
    principal: Principal,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        principal: Principal,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            principal,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Time left until expiry as seen from `now`. Negative once expired.
    ///
    /// Returns `None` if the credential carries no expiry metadata.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|expires_at| expires_at - now)
    }

    /// Whether both credentials carry the same token pair.
    ///
    /// Unlike `==` this ignores the principal and sub-second expiry
    /// precision, which is lost when a credential is stored.
    pub fn same_tokens(&self, other: &Credential) -> bool {
        self.access_token == other.access_token && self.refresh_token == other.refresh_token
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("principal", &self.principal)
            .finish()
    }
}

/// Input accepted by [`AuthProviderClient::sign_in`](crate::traits::AuthProviderClient::sign_in).
#[derive(Clone, PartialEq, Eq)]
pub enum SignInInput {
    /// Email and password.
    Password { email: String, password: String },
}

impl SignInInput {
    pub fn password(email: impl Into<String>, password: impl Into<String>) -> Self {
        SignInInput::Password {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for SignInInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignInInput::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}
