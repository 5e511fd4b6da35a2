//! Concrete implementations of trait abstractions.
//!
//! This module provides production-ready adapters implementing the traits
//! defined in `crate::traits`. The session store only sees the traits, so any
//! adapter can be swapped for a test double.
//!
//! # Adapters
//!
//! - [`HttpAuthProvider`] - Identity provider over HTTP using reqwest
//! - [`FileCredentialStore`] - File-based secure storage with legacy migration
//! - [`SystemClock`] - Wall clock
//! - [`TokioSleeper`] - Sleep on the tokio timer
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides test doubles for all adapters:
//! - [`mock::MockAuthProvider`] - Scripted refresh results and injected events
//! - [`mock::InMemoryCredentialStore`] - In-memory storage
//! - [`mock::ManualClock`] - Hand-driven clock
//! - [`mock::RecordingSleeper`] - Records backoff delays without waiting

pub mod file_store;
pub mod http_provider;
pub mod mock;
pub mod runtime;

pub use file_store::{FileCredentialStore, LegacyKeyPattern};
pub use http_provider::HttpAuthProvider;
pub use mock::{InMemoryCredentialStore, ManualClock, MockAuthProvider, RecordingSleeper};
pub use runtime::{SystemClock, TokioSleeper};
