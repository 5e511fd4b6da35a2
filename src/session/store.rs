//! The session state store.
//!
//! [`SessionStateStore`] owns the single [`SessionState`], drives the
//! `Idle -> Initializing -> Ready` lifecycle and consumes the provider's
//! credential events. Every change follows the same path: validate, mutate
//! under the state lock, then notify listeners.
//!
//! # Ordering
//!
//! Async mutations (`initialize`, `validate_auth_session`, `refresh_auth`,
//! `clear_all_sessions`, `sign_in` and provider events) are serialized by a
//! tokio mutex, so one operation's validation never starts before the
//! previous operation has committed and notified. Each commit enqueues its
//! snapshot together with the listeners registered at that moment; a single
//! drainer delivers the queue in commit order. Listeners may call back into
//! the store, setters included.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::listeners::{ListenerRegistry, ListenerSnapshot, Subscription};
use super::state::{SessionPhase, SessionState};
use crate::adapters::{FileCredentialStore, HttpAuthProvider};
use crate::auth::{Credential, CredentialValidator, Principal, SignInInput, ValidationResult};
use crate::config::{ProviderConfig, SessionConfig};
use crate::error::{AuthError, SessionResult};
use crate::traits::{AuthProviderClient, CredentialEvent, SecureCredentialStore};

/// How many committed credentials are remembered for echo detection.
const COMMITTED_HISTORY: usize = 16;

#[derive(Default)]
struct Outbox {
    queue: VecDeque<(SessionState, ListenerSnapshot)>,
    draining: bool,
}

#[derive(Default)]
struct Lifecycle {
    initialized: bool,
    phase: SessionPhase,
    consumer: Option<JoinHandle<()>>,
    /// Cancelled and replaced by `destroy()`. Operations capture it on entry
    /// and only commit while it is live.
    cancel: CancellationToken,
}

struct StoreInner {
    provider: Arc<dyn AuthProviderClient>,
    storage: Arc<dyn SecureCredentialStore>,
    validator: CredentialValidator,
    config: SessionConfig,
    state: RwLock<SessionState>,
    listeners: ListenerRegistry,
    outbox: Mutex<Outbox>,
    mutation: tokio::sync::Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
    /// Credentials this store has published, newest last.
    committed: Mutex<VecDeque<Credential>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        lifecycle.cancel.cancel();
        if let Some(consumer) = lifecycle.consumer.take() {
            consumer.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single source of truth for the session.
///
/// Cheap to clone; clones share state. Build one per application in the
/// composition root and hand clones to the features that need it.
///
/// # Example
///
/// ```ignore
/// use session_core::session::SessionStateStore;
///
/// let store = SessionStateStore::from_env()?;
/// let subscription = store.add_listener(|state| {
///     println!("signed in: {}", state.is_authenticated());
/// });
/// store.initialize().await;
///
/// store.set_chat_session_id(Some("chat-42"));
/// if !store.refresh_auth().await {
///     // show the sign-in screen
/// }
///
/// subscription.unsubscribe();
/// store.destroy();
/// ```
#[derive(Clone)]
pub struct SessionStateStore {
    inner: Arc<StoreInner>,
}

impl SessionStateStore {
    /// Create a store with the default configuration.
    pub fn new(
        provider: Arc<dyn AuthProviderClient>,
        storage: Arc<dyn SecureCredentialStore>,
    ) -> Self {
        Self::with_config(provider, storage, SessionConfig::default())
    }

    /// Create a store whose validator follows `config`.
    pub fn with_config(
        provider: Arc<dyn AuthProviderClient>,
        storage: Arc<dyn SecureCredentialStore>,
        config: SessionConfig,
    ) -> Self {
        let validator =
            CredentialValidator::new(Arc::clone(&provider)).with_expiry_buffer(config.expiry_buffer);
        Self::from_parts(provider, storage, validator, config)
    }

    /// Create a store around a prepared validator (custom clock or sleeper).
    pub fn from_parts(
        provider: Arc<dyn AuthProviderClient>,
        storage: Arc<dyn SecureCredentialStore>,
        validator: CredentialValidator,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                provider,
                storage,
                validator,
                config,
                state: RwLock::new(SessionState::default()),
                listeners: ListenerRegistry::new(),
                outbox: Mutex::new(Outbox::default()),
                mutation: tokio::sync::Mutex::new(()),
                lifecycle: Mutex::new(Lifecycle::default()),
                committed: Mutex::new(VecDeque::with_capacity(COMMITTED_HISTORY)),
            }),
        }
    }

    /// Wire the file store, HTTP provider and configs from the environment.
    ///
    /// # Errors
    /// Invalid `SESSION_CORE_*` values, an undeterminable home directory, or
    /// an HTTP client that cannot be built.
    pub fn from_env() -> SessionResult<Self> {
        let storage: Arc<dyn SecureCredentialStore> = Arc::new(FileCredentialStore::new()?);
        let provider = HttpAuthProvider::new(ProviderConfig::from_env()?, Arc::clone(&storage))?;
        Ok(Self::with_config(
            Arc::new(provider),
            storage,
            SessionConfig::from_env()?,
        ))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.inner.lifecycle)
    }

    fn cancel_token(&self) -> CancellationToken {
        self.lifecycle().cancel.clone()
    }

    // ---- commit path ----

    /// Apply `mutate`, bump the version and enqueue the notification.
    fn commit<F>(&self, mutate: F) -> SessionState
    where
        F: FnOnce(&mut SessionState),
    {
        self.try_commit(None, mutate)
            .unwrap_or_else(|| self.read_state().clone())
    }

    /// Like [`commit`](Self::commit), but skipped if `cancel` fired.
    ///
    /// The check happens under the state lock, and `destroy()` cancels under
    /// the same lock, so nothing commits after a destroy returns.
    fn commit_if_live<F>(&self, cancel: &CancellationToken, mutate: F) -> Option<SessionState>
    where
        F: FnOnce(&mut SessionState),
    {
        self.try_commit(Some(cancel), mutate)
    }

    fn try_commit<F>(&self, cancel: Option<&CancellationToken>, mutate: F) -> Option<SessionState>
    where
        F: FnOnce(&mut SessionState),
    {
        let (snapshot, previous_principal) = {
            let mut state = self.write_state();
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!("Store torn down, dropping pending state change");
                return None;
            }

            let previous_principal = state.auth().principal().map(|p| p.id().to_string());
            let version = state.version();
            mutate(&mut state);
            state.set_version(version + 1);
            if let Some(credential) = state.auth().credential() {
                self.remember_committed(credential);
            }

            let snapshot = state.clone();
            lock(&self.inner.outbox)
                .queue
                .push_back((snapshot.clone(), self.inner.listeners.snapshot()));
            (snapshot, previous_principal)
        };

        let principal_id = snapshot.auth().principal().map(Principal::id);
        if principal_id != previous_principal.as_deref() {
            info!(principal_id = ?principal_id, "Session principal changed");
        }

        self.drain();
        Some(snapshot)
    }

    fn remember_committed(&self, credential: &Credential) {
        let mut committed = lock(&self.inner.committed);
        if committed.contains(credential) {
            return;
        }
        if committed.len() == COMMITTED_HISTORY {
            committed.pop_front();
        }
        committed.push_back(credential.clone());
    }

    fn has_committed(&self, credential: &Credential) -> bool {
        lock(&self.inner.committed).contains(credential)
    }

    /// Whether the provider still holds `expected` (`None` for a sign-out).
    /// A provider that cannot answer is given the benefit of the doubt.
    async fn provider_agrees(&self, expected: Option<&Credential>) -> bool {
        match self.inner.provider.current_credential().await {
            Ok(current) => match (current.as_ref(), expected) {
                (Some(current), Some(expected)) => current.same_tokens(expected),
                (current, expected) => current.is_none() && expected.is_none(),
            },
            Err(e) => {
                warn!(
                    code = e.error_code(),
                    "Could not confirm credential event with provider: {}",
                    e
                );
                true
            }
        }
    }

    /// Deliver queued notifications. Reentrant calls return immediately and
    /// leave their entries to the active drainer.
    fn drain(&self) {
        {
            let mut outbox = lock(&self.inner.outbox);
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let next = {
                let mut outbox = lock(&self.inner.outbox);
                match outbox.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            let (state, listeners) = next;
            listeners.deliver(&state);
        }
    }

    // ---- lifecycle ----

    /// Migrate storage, validate the current credential, publish, then start
    /// consuming provider events.
    ///
    /// A second call before [`destroy`](Self::destroy) is a logged no-op.
    pub async fn initialize(&self) {
        let cancel = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.initialized {
                warn!("Session store already initialized");
                return;
            }
            lifecycle.initialized = true;
            lifecycle.phase = SessionPhase::Initializing;
            lifecycle.cancel.clone()
        };

        info!("Initializing session store");
        let _guard = self.inner.mutation.lock().await;

        match self.inner.storage.migrate_legacy_storage().await {
            Ok(0) => {}
            Ok(migrated) => info!(migrated, "Migrated legacy credential storage"),
            Err(e) => warn!("Credential storage migration failed: {}", e),
        }

        if !self.inner.provider.is_configured() {
            warn!("Identity provider not configured, continuing without a session");
            self.commit_if_live(&cancel, |state| state.auth_mut().finish_loading());
            self.mark_ready(&cancel, None);
            return;
        }

        // Subscribe before fetching so events raised meanwhile are queued.
        let events = self.inner.provider.subscribe();
        let result = self
            .inner
            .validator
            .get_valid_credential(&self.inner.config.retry)
            .await;
        let now = self.inner.validator.clock().now();
        let Some(snapshot) =
            self.commit_if_live(&cancel, |state| state.auth_mut().apply_validation(&result, now))
        else {
            return;
        };

        let consumer = self.spawn_event_consumer(events, cancel.clone());
        self.mark_ready(&cancel, Some(consumer));

        info!(
            has_session = snapshot.is_authenticated(),
            principal_id = ?snapshot.auth().principal().map(Principal::id),
            "Session store initialized"
        );
    }

    fn mark_ready(&self, cancel: &CancellationToken, consumer: Option<JoinHandle<()>>) {
        let mut lifecycle = self.lifecycle();
        if cancel.is_cancelled() {
            if let Some(consumer) = consumer {
                consumer.abort();
            }
            return;
        }
        lifecycle.phase = SessionPhase::Ready;
        lifecycle.consumer = consumer;
    }

    fn spawn_event_consumer(
        &self,
        mut events: broadcast::Receiver<CredentialEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner: Weak<StoreInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => received,
                };

                match received {
                    Ok(event) => {
                        let Some(inner) = inner.upgrade() else {
                            break;
                        };
                        SessionStateStore { inner }.handle_event(event, &cancel).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Credential event stream lagged, some events were dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Credential event stream closed");
                        break;
                    }
                }
            }
        })
    }

    async fn handle_event(&self, event: CredentialEvent, cancel: &CancellationToken) {
        info!(event = event.name(), "Credential event received");
        let _guard = self.inner.mutation.lock().await;

        // Providers echo the store's own refreshes, sign-ins and sign-outs, and
        // an echo may arrive after a newer commit. Only news is applied.
        match event.credential() {
            Some(credential) if self.has_committed(credential) => {
                debug!(event = event.name(), "Ignoring event for an already committed credential");
                return;
            }
            None if !self.is_authenticated() => {
                debug!("Ignoring sign-out, no session held");
                return;
            }
            _ => {}
        }
        if !self.provider_agrees(event.credential()).await {
            debug!(event = event.name(), "Ignoring stale credential event");
            return;
        }

        match event.credential() {
            Some(credential) => {
                let result = self
                    .inner
                    .validator
                    .ensure_valid_credential(Some(credential.clone()), &self.inner.config.retry)
                    .await;
                let now = self.inner.validator.clock().now();
                self.commit_if_live(cancel, |state| state.auth_mut().apply_validation(&result, now));
            }
            None => {
                // Chat is scoped to the principal; analytics outlives it.
                self.commit_if_live(cancel, |state| {
                    state.auth_mut().clear();
                    state.chat_mut().set_current_conversation_id(None);
                });
            }
        }
    }

    /// Tear down: stop consuming events, abort in-flight refreshes, drop
    /// queued notifications and listeners, and allow a new `initialize()`.
    ///
    /// Safe before `initialize()` and safe to repeat.
    pub fn destroy(&self) {
        let consumer = {
            let _state = self.write_state();
            let mut lifecycle = self.lifecycle();
            lifecycle.cancel.cancel();
            lifecycle.cancel = CancellationToken::new();
            lifecycle.initialized = false;
            lifecycle.phase = SessionPhase::Idle;
            lifecycle.consumer.take()
        };

        if let Some(consumer) = consumer {
            consumer.abort();
        }
        self.inner.validator.cancel_in_flight();
        lock(&self.inner.outbox).queue.clear();
        self.inner.listeners.clear();

        info!("Session store destroyed");
    }

    // ---- async operations ----

    /// Validate (refreshing if needed) and commit. With `force_refresh`, a
    /// present credential is refreshed even if it looks valid locally.
    pub(super) async fn revalidate(&self, force_refresh: bool) -> ValidationResult {
        let cancel = self.cancel_token();
        let _guard = self.inner.mutation.lock().await;

        let current = self.get_credential();
        let retry = &self.inner.config.retry;
        let result = match current {
            Some(credential) if force_refresh && self.inner.provider.is_configured() => {
                self.inner.validator.refresh_credential(&credential, retry).await
            }
            current => self.inner.validator.ensure_valid_credential(current, retry).await,
        };

        let now = self.inner.validator.clock().now();
        match self.commit_if_live(&cancel, |state| state.auth_mut().apply_validation(&result, now)) {
            Some(_) => result,
            None => ValidationResult::invalid(AuthError::Cancelled),
        }
    }

    /// Re-check the stored credential, refreshing it if needed, and publish.
    ///
    /// # Returns
    /// Whether the session ended valid.
    pub async fn validate_auth_session(&self) -> bool {
        self.revalidate(false).await.is_valid
    }

    /// Force a session re-check. Same as [`validate_auth_session`](Self::validate_auth_session).
    pub async fn refresh_auth(&self) -> bool {
        self.validate_auth_session().await
    }

    /// Sign out remotely (best effort) and reset every sub-state.
    pub async fn clear_all_sessions(&self) {
        let cancel = self.cancel_token();
        let _guard = self.inner.mutation.lock().await;

        if self.inner.provider.is_configured() {
            if let Err(e) = self.inner.provider.sign_out().await {
                warn!(
                    code = e.error_code(),
                    "Remote sign-out failed, clearing local session anyway: {}",
                    e
                );
            }
        }

        if self
            .commit_if_live(&cancel, |state| *state = SessionState::signed_out())
            .is_some()
        {
            info!("All sessions cleared");
        }
    }

    /// Sign in through the provider and publish the new session.
    ///
    /// On failure the state is left untouched.
    pub async fn sign_in(&self, input: &SignInInput) -> Result<Principal, AuthError> {
        let cancel = self.cancel_token();
        let _guard = self.inner.mutation.lock().await;

        let credential = self.inner.provider.sign_in(input).await?;
        let result = self
            .inner
            .validator
            .ensure_valid_credential(Some(credential), &self.inner.config.retry)
            .await;

        let principal = match (&result.credential, result.is_valid) {
            (Some(credential), true) => credential.principal().clone(),
            _ => {
                return Err(result.error.unwrap_or(AuthError::Authentication {
                    status: None,
                    message: "sign-in returned an unusable credential".to_string(),
                }))
            }
        };

        let now = self.inner.validator.clock().now();
        self.commit_if_live(&cancel, |state| state.auth_mut().apply_validation(&result, now))
            .ok_or(AuthError::Cancelled)?;
        Ok(principal)
    }

    // ---- synchronous setters and reads ----

    /// Set the current chat conversation and publish.
    pub fn set_chat_session_id(&self, id: Option<&str>) {
        self.commit(|state| {
            state
                .chat_mut()
                .set_current_conversation_id(id.map(str::to_string))
        });
        debug!(session_id = ?id, "Chat session id updated");
    }

    pub fn get_chat_session_id(&self) -> Option<String> {
        self.read_state()
            .chat()
            .current_conversation_id()
            .map(str::to_string)
    }

    /// Set the analytics session and publish.
    pub fn set_analytics_session_id(&self, id: Option<&str>) {
        self.commit(|state| state.analytics_mut().set_session_id(id.map(str::to_string)));
        debug!(session_id = ?id, "Analytics session id updated");
    }

    pub fn get_analytics_session_id(&self) -> Option<String> {
        self.read_state().analytics().session_id().map(str::to_string)
    }

    /// A private copy of the current state.
    pub fn get_state(&self) -> SessionState {
        self.read_state().clone()
    }

    pub fn get_current_principal(&self) -> Option<Principal> {
        self.read_state().auth().principal().cloned()
    }

    pub fn get_credential(&self) -> Option<Credential> {
        self.read_state().auth().credential().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_authenticated()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lifecycle().phase
    }

    /// Register a state listener. It sees every commit made after this call.
    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.inner.listeners.add_listener(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for SessionStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateStore")
            .field("phase", &self.phase())
            .field("version", &self.read_state().version())
            .field("listeners", &self.inner.listeners)
            .finish_non_exhaustive()
    }
}
