//! Session Core - session and credential lifecycle for client applications
//!
//! Validates and refreshes credentials with exponential backoff, owns one
//! observable session state, and reacts to identity provider events.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;
pub mod session;
pub mod telemetry;
pub mod traits;

pub use auth::{Credential, CredentialValidator, Principal, RetryOptions, ValidationResult};
pub use error::{AuthError, SessionError, SessionResult};
pub use session::{SessionState, SessionStateStore};
