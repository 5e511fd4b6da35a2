//! Prelude module for convenient imports.
//!
//! ```ignore
//! use session_core::prelude::*;
//! ```

// Store and state
pub use crate::session::{
    GuardError, SessionPhase, SessionState, SessionStateStore, Subscription,
};

// Credentials
pub use crate::auth::{Credential, Principal, RetryOptions, SignInInput, ValidationResult};

// Configuration
pub use crate::config::{ProviderConfig, SessionConfig};

// Errors
pub use crate::error::{AuthError, ErrorCategory, SessionError, SessionResult};

// Seams
pub use crate::traits::{AuthProviderClient, CredentialEvent, SecureCredentialStore};
