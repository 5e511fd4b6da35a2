//! Mock implementations for testing.
//!
//! This module provides mock implementations of all trait abstractions,
//! enabling unit testing without network dependencies, file system access,
//! or wall-clock waits.
//!
//! # Available Mocks
//!
//! - [`MockAuthProvider`] - Identity provider with scripted refresh results
//! - [`InMemoryCredentialStore`] - In-memory secure storage with legacy items
//! - [`ManualClock`] - Clock that moves only when told to
//! - [`RecordingSleeper`] - Sleeper that records delays without waiting

pub mod provider;
pub mod runtime;
pub mod store;

pub use provider::MockAuthProvider;
pub use runtime::{ManualClock, RecordingSleeper};
pub use store::InMemoryCredentialStore;
