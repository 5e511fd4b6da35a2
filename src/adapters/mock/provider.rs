//! Mock identity provider for testing.
//!
//! Refresh outcomes are scripted per call, every entry point counts its calls,
//! and events are injected by hand. The mock never emits events on its own.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::auth::{Credential, SignInInput};
use crate::error::AuthError;
use crate::traits::{AuthProviderClient, CredentialEvent};

/// Mock identity provider for testing.
///
/// # Example
///
/// ```ignore
/// use session_core::adapters::mock::MockAuthProvider;
/// use session_core::error::AuthError;
///
/// let provider = MockAuthProvider::new();
/// provider.push_refresh_result(Err(AuthError::network("timeout")));
/// provider.push_refresh_result(Ok(fresh_credential));
///
/// // ... drive the code under test ...
///
/// assert_eq!(provider.refresh_calls(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockAuthProvider {
    /// Broadcast sender for injected events
    events_tx: broadcast::Sender<CredentialEvent>,
    /// Reported by `is_configured`
    configured: Arc<Mutex<bool>>,
    /// Returned by `current_credential`
    current: Arc<Mutex<Option<Credential>>>,
    /// When set, `current_credential` fails with it
    current_error: Arc<Mutex<Option<AuthError>>>,
    /// Scripted refresh outcomes, consumed front to back
    refresh_results: Arc<Mutex<VecDeque<Result<Credential, AuthError>>>>,
    /// Artificial latency for each refresh
    refresh_delay: Arc<Mutex<Option<Duration>>>,
    /// Whether refresh should panic
    panic_on_refresh: Arc<Mutex<bool>>,
    /// Outcome of the next `sign_in`
    sign_in_result: Arc<Mutex<Option<Result<Credential, AuthError>>>>,
    /// When set, `sign_out` fails with it
    sign_out_error: Arc<Mutex<Option<AuthError>>>,
    refresh_calls: Arc<AtomicUsize>,
    sign_in_calls: Arc<AtomicUsize>,
    sign_out_calls: Arc<AtomicUsize>,
}

impl MockAuthProvider {
    /// Create a configured provider with no credential.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(64);

        Self {
            events_tx,
            configured: Arc::new(Mutex::new(true)),
            current: Arc::new(Mutex::new(None)),
            current_error: Arc::new(Mutex::new(None)),
            refresh_results: Arc::new(Mutex::new(VecDeque::new())),
            refresh_delay: Arc::new(Mutex::new(None)),
            panic_on_refresh: Arc::new(Mutex::new(false)),
            sign_in_result: Arc::new(Mutex::new(None)),
            sign_out_error: Arc::new(Mutex::new(None)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            sign_in_calls: Arc::new(AtomicUsize::new(0)),
            sign_out_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a provider that reports itself as not configured.
    pub fn unconfigured() -> Self {
        let provider = Self::new();
        provider.set_configured(false);
        provider
    }

    /// Create a provider already holding a credential.
    pub fn with_credential(credential: Credential) -> Self {
        let provider = Self::new();
        provider.set_current(Some(credential));
        provider
    }

    pub fn set_configured(&self, configured: bool) {
        *self.configured.lock().unwrap() = configured;
    }

    pub fn set_current(&self, credential: Option<Credential>) {
        *self.current.lock().unwrap() = credential;
    }

    pub fn current(&self) -> Option<Credential> {
        self.current.lock().unwrap().clone()
    }

    pub fn set_current_error(&self, error: Option<AuthError>) {
        *self.current_error.lock().unwrap() = error;
    }

    /// Queue the outcome of the next unscripted refresh call.
    ///
    /// With nothing queued, refresh fails with a non-retryable 401.
    pub fn push_refresh_result(&self, result: Result<Credential, AuthError>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_panic_on_refresh(&self, should_panic: bool) {
        *self.panic_on_refresh.lock().unwrap() = should_panic;
    }

    pub fn set_sign_in_result(&self, result: Result<Credential, AuthError>) {
        *self.sign_in_result.lock().unwrap() = Some(result);
    }

    pub fn set_sign_out_error(&self, error: Option<AuthError>) {
        *self.sign_out_error.lock().unwrap() = error;
    }

    /// Inject an event. It is delivered to every live subscriber.
    pub fn emit(&self, event: CredentialEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.events_tx.send(event);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Get the number of live event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events_tx.receiver_count()
    }
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProviderClient for MockAuthProvider {
    fn is_configured(&self) -> bool {
        *self.configured.lock().unwrap()
    }

    async fn current_credential(&self) -> Result<Option<Credential>, AuthError> {
        if let Some(err) = self.current_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.current())
    }

    async fn sign_in(&self, _input: &SignInInput) -> Result<Credential, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .sign_in_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(AuthError::from_status(400, "Mock sign-in not scripted")));
        if let Ok(credential) = &result {
            self.set_current(Some(credential.clone()));
        }
        result
    }

    async fn refresh(&self, _credential: &Credential) -> Result<Credential, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.panic_on_refresh.lock().unwrap() {
            panic!("mock provider panicked during refresh");
        }

        let result = self
            .refresh_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::from_status(401, "Mock refresh not scripted")));
        if let Ok(credential) = &result {
            self.set_current(Some(credential.clone()));
        }
        result
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.set_current(None);
        match self.sign_out_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events_tx.subscribe()
    }
}
