//! Session state management.
//!
//! This module provides:
//! - [`SessionStateStore`]: the single owner of session state
//! - [`SessionState`] and its auth, chat and analytics sub-states
//! - [`ListenerRegistry`]: change listeners with unsubscribe handles
//! - [`SessionStateStore::with_valid_session`]: run work behind a valid session

pub mod guard;
pub mod listeners;
pub mod state;
pub mod store;

pub use guard::{GuardError, RequiresReauth};
pub use listeners::{Listener, ListenerRegistry, ListenerSnapshot, Subscription};
pub use state::{AnalyticsState, AuthState, ChatState, SessionPhase, SessionState};
pub use store::SessionStateStore;
