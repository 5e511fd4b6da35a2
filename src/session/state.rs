//! Session state snapshot types.
//!
//! Fields are private: only the store writes them, through the `pub(crate)`
//! mutators below, which keep the auth invariants intact:
//!
//! - `principal` is present iff `credential` is present
//! - `last_validated_at` is present iff the latest validation succeeded
//! - `is_loading` is true only until the first validation completes

use chrono::{DateTime, Utc};

use crate::auth::{Credential, Principal, ValidationResult};

/// Lifecycle of a [`SessionStateStore`](super::SessionStateStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Constructed (or destroyed) and not initialized.
    #[default]
    Idle,
    /// `initialize()` is running.
    Initializing,
    /// Initial validation done; events are being consumed.
    Ready,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Ready => "ready",
        };
        write!(f, "{}", name)
    }
}

/// Authentication sub-state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    credential: Option<Credential>,
    principal: Option<Principal>,
    is_loading: bool,
    last_validated_at: Option<DateTime<Utc>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            credential: None,
            principal: None,
            is_loading: true,
            last_validated_at: None,
        }
    }
}

impl AuthState {
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_validated_at(&self) -> Option<DateTime<Utc>> {
        self.last_validated_at
    }

    /// Write a validation outcome. Credential, principal and timestamp move together.
    pub(crate) fn apply_validation(&mut self, result: &ValidationResult, now: DateTime<Utc>) {
        match (&result.credential, result.is_valid) {
            (Some(credential), true) => {
                self.principal = Some(credential.principal().clone());
                self.credential = Some(credential.clone());
                self.last_validated_at = Some(now);
            }
            _ => {
                self.credential = None;
                self.principal = None;
                self.last_validated_at = None;
            }
        }
        self.is_loading = false;
    }

    pub(crate) fn clear(&mut self) {
        self.credential = None;
        self.principal = None;
        self.last_validated_at = None;
        self.is_loading = false;
    }

    pub(crate) fn finish_loading(&mut self) {
        self.is_loading = false;
    }
}

/// Chat sub-state. Scoped to the signed-in principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    current_conversation_id: Option<String>,
}

impl ChatState {
    pub fn current_conversation_id(&self) -> Option<&str> {
        self.current_conversation_id.as_deref()
    }

    pub(crate) fn set_current_conversation_id(&mut self, id: Option<String>) {
        self.current_conversation_id = id;
    }
}

/// Analytics sub-state. Survives provider sign-outs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsState {
    session_id: Option<String>,
}

impl AnalyticsState {
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub(crate) fn set_session_id(&mut self, id: Option<String>) {
        self.session_id = id;
    }
}

/// One atomic snapshot of every sub-state.
///
/// Listeners and callers always get their own clone; nothing they do to it
/// reaches the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    version: u64,
    auth: AuthState,
    chat: ChatState,
    analytics: AnalyticsState,
}

impl SessionState {
    /// The fully cleared state written by `clear_all_sessions`.
    pub(crate) fn signed_out() -> Self {
        let mut state = Self::default();
        state.auth.clear();
        state
    }

    /// Bumped on every committed mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn chat(&self) -> &ChatState {
        &self.chat
    }

    pub fn analytics(&self) -> &AnalyticsState {
        &self.analytics
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.credential.is_some()
    }

    pub(crate) fn auth_mut(&mut self) -> &mut AuthState {
        &mut self.auth
    }

    pub(crate) fn chat_mut(&mut self) -> &mut ChatState {
        &mut self.chat
    }

    pub(crate) fn analytics_mut(&mut self) -> &mut AnalyticsState {
        &mut self.analytics
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
