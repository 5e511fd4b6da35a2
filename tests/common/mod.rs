//! Common test utilities for integration tests.
//!
//! This module provides credential fixtures and a builder that wires a
//! [`SessionStateStore`] to the in-crate mocks.
//!
//! # Example
//!
//! ```ignore
//! use common::{TestStoreBuilder, credential_expiring_in};
//!
//! let harness = TestStoreBuilder::new()
//!     .with_current(credential_expiring_in("refresh-1", 3600))
//!     .build();
//! harness.store.initialize().await;
//! ```

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use session_core::adapters::mock::{
    InMemoryCredentialStore, ManualClock, MockAuthProvider, RecordingSleeper,
};
use session_core::adapters::TokioSleeper;
use session_core::auth::{Credential, CredentialValidator, Principal, RetryOptions};
use session_core::config::SessionConfig;
use session_core::session::{SessionState, SessionStateStore};

/// Fixed instant every harness clock starts at.
pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A credential for `user-1` expiring `secs` after [`epoch`].
pub fn credential_expiring_in(refresh_token: &str, secs: i64) -> Credential {
    Credential::new(
        format!("access-{}", refresh_token),
        refresh_token,
        Some(epoch() + chrono::Duration::seconds(secs)),
        Principal::new("user-1").with_email("user-1@example.com"),
    )
}

/// Valid for an hour.
pub fn valid_credential() -> Credential {
    credential_expiring_in("refresh-valid", 3600)
}

/// Expired an hour ago.
pub fn expired_credential() -> Credential {
    credential_expiring_in("refresh-expired", -3600)
}

/// A store plus handles on all of its doubles.
pub struct TestStore {
    pub store: SessionStateStore,
    pub provider: Arc<MockAuthProvider>,
    pub storage: Arc<InMemoryCredentialStore>,
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<RecordingSleeper>,
}

/// Builder for [`TestStore`].
pub struct TestStoreBuilder {
    provider: MockAuthProvider,
    storage: InMemoryCredentialStore,
    retry: RetryOptions,
    real_sleeper: bool,
}

impl TestStoreBuilder {
    pub fn new() -> Self {
        Self {
            provider: MockAuthProvider::new(),
            storage: InMemoryCredentialStore::new(),
            retry: RetryOptions::default(),
            real_sleeper: false,
        }
    }

    pub fn with_provider(mut self, provider: MockAuthProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_current(self, credential: Credential) -> Self {
        self.provider.set_current(Some(credential));
        self
    }

    pub fn with_storage(mut self, storage: InMemoryCredentialStore) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Back off on real tokio timers instead of recording delays.
    pub fn with_real_sleeper(mut self) -> Self {
        self.real_sleeper = true;
        self
    }

    pub fn build(self) -> TestStore {
        let provider = Arc::new(self.provider);
        let storage = Arc::new(self.storage);
        let clock = Arc::new(ManualClock::new(epoch()));
        let sleeper = Arc::new(RecordingSleeper::new());

        let validator = CredentialValidator::new(provider.clone()).with_clock(clock.clone());
        let validator = if self.real_sleeper {
            validator.with_sleeper(Arc::new(TokioSleeper))
        } else {
            validator.with_sleeper(sleeper.clone())
        };

        let store = SessionStateStore::from_parts(
            provider.clone(),
            storage.clone(),
            validator,
            SessionConfig::new().with_retry(self.retry),
        );

        TestStore {
            store,
            provider,
            storage,
            clock,
            sleeper,
        }
    }
}

impl Default for TestStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener that counts calls and keeps every state it saw.
#[derive(Clone, Default)]
pub struct RecordingListener {
    calls: Arc<AtomicUsize>,
    states: Arc<Mutex<Vec<SessionState>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closure to pass to `add_listener`.
    pub fn callback(&self) -> impl Fn(&SessionState) + Send + Sync + 'static {
        let calls = self.calls.clone();
        let states = self.states.clone();
        move |state: &SessionState| {
            calls.fetch_add(1, Ordering::SeqCst);
            states.lock().unwrap().push(state.clone());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SessionState> {
        self.states.lock().unwrap().last().cloned()
    }

    pub fn versions(&self) -> Vec<u64> {
        self.states().iter().map(SessionState::version).collect()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_for<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}
