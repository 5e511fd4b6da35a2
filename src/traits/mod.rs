//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`AuthProviderClient`] - Identity provider: sign-in, refresh, sign-out, events
//! - [`SecureCredentialStore`] - Credential persistence and legacy migration
//! - [`Clock`] - Current time, for expiry checks
//! - [`Sleeper`] - Async sleep, for retry backoff

pub mod auth_provider;
pub mod credential_store;
pub mod runtime;

pub use auth_provider::{AuthProviderClient, CredentialEvent};
pub use credential_store::{SecureCredentialStore, StorageError};
pub use runtime::{Clock, Sleeper};
