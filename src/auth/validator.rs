//! Credential validation and refresh with exponential backoff.
//!
//! [`CredentialValidator::validate_credential`] is a pure local check against
//! the clock. [`CredentialValidator::ensure_valid_credential`] heals an
//! expired credential by calling the provider's refresh endpoint in a bounded
//! retry loop. Concurrent refreshes of the same credential are coalesced into
//! a single provider call, since refresh tokens are usually single-use.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::credential::Credential;
use crate::adapters::{SystemClock, TokioSleeper};
use crate::error::{AuthError, SessionError, SessionResult};
use crate::traits::{AuthProviderClient, Clock, Sleeper};

/// Default safety margin before expiry. A token inside this window is
/// considered expired so in-flight requests never carry a dying token.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Outcome of a validation or refresh. Expected failures live in `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub credential: Option<Credential>,
    pub error: Option<AuthError>,
}

impl ValidationResult {
    pub fn valid(credential: Credential) -> Self {
        Self {
            is_valid: true,
            credential: Some(credential),
            error: None,
        }
    }

    pub fn invalid(error: AuthError) -> Self {
        Self {
            is_valid: false,
            credential: None,
            error: Some(error),
        }
    }

    /// No session at all. Not an error.
    pub fn absent() -> Self {
        Self {
            is_valid: false,
            credential: None,
            error: None,
        }
    }
}

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryOptions {
    /// Create validated retry options.
    ///
    /// # Errors
    /// [`SessionError::InvalidRetryOptions`] if `max_retries` is zero or the
    /// initial delay exceeds the cap.
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> SessionResult<Self> {
        if max_retries == 0 {
            return Err(SessionError::InvalidRetryOptions {
                reason: "max_retries must be at least 1".to_string(),
            });
        }
        if initial_delay > max_delay {
            return Err(SessionError::InvalidRetryOptions {
                reason: format!(
                    "initial_delay ({:?}) exceeds max_delay ({:?})",
                    initial_delay, max_delay
                ),
            });
        }
        Ok(Self {
            max_retries,
            initial_delay,
            max_delay,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// `min(initial_delay * 2^attempt, max_delay)`, with `attempt` 0-indexed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, ValidationResult>>;

struct InFlight {
    /// Pending refreshes keyed by refresh token, tagged with a generation id.
    refreshes: HashMap<String, (u64, SharedRefresh)>,
    next_id: u64,
    cancel: CancellationToken,
}

fn lock(in_flight: &Mutex<InFlight>) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decides whether a credential is usable and heals it when it is not.
#[derive(Clone)]
pub struct CredentialValidator {
    provider: Arc<dyn AuthProviderClient>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    expiry_buffer: Duration,
    in_flight: Arc<Mutex<InFlight>>,
}

impl CredentialValidator {
    /// Create a validator on the system clock and tokio timers.
    pub fn new(provider: Arc<dyn AuthProviderClient>) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
            in_flight: Arc::new(Mutex::new(InFlight {
                refreshes: HashMap::new(),
                next_id: 0,
                cancel: CancellationToken::new(),
            })),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    pub fn provider(&self) -> &Arc<dyn AuthProviderClient> {
        &self.provider
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Local expiry check. Never touches the network.
    pub fn validate_credential(&self, credential: Option<&Credential>) -> ValidationResult {
        let Some(credential) = credential else {
            return ValidationResult::absent();
        };

        match credential.expires_in(self.clock.now()) {
            Some(expires_in) => {
                // Negative durations fail `to_std`, so already-expired lands here too.
                let expired = expires_in
                    .to_std()
                    .map_or(true, |remaining| remaining < self.expiry_buffer);
                if expired {
                    debug!(
                        expires_in_secs = expires_in.num_seconds(),
                        principal_id = credential.principal().id(),
                        "Credential expired or about to expire"
                    );
                    ValidationResult::invalid(AuthError::Expired {
                        expires_in_secs: expires_in.num_seconds(),
                    })
                } else {
                    ValidationResult::valid(credential.clone())
                }
            }
            None => {
                warn!(
                    principal_id = credential.principal().id(),
                    "Credential has no expiry metadata, assuming valid"
                );
                ValidationResult::valid(credential.clone())
            }
        }
    }

    /// Return a usable credential, refreshing it if the local check fails.
    ///
    /// A valid credential is returned unchanged without any provider call.
    /// `None` yields an invalid result immediately.
    pub async fn ensure_valid_credential(
        &self,
        credential: Option<Credential>,
        options: &RetryOptions,
    ) -> ValidationResult {
        let validation = self.validate_credential(credential.as_ref());
        if validation.is_valid {
            return validation;
        }

        let Some(credential) = credential else {
            return validation;
        };

        if !self.provider.is_configured() {
            return ValidationResult::invalid(AuthError::NotConfigured);
        }

        self.refresh_credential(&credential, options).await
    }

    /// Fetch the provider's current credential and ensure it is valid.
    pub async fn get_valid_credential(&self, options: &RetryOptions) -> ValidationResult {
        if !self.provider.is_configured() {
            return ValidationResult::invalid(AuthError::NotConfigured);
        }

        match self.provider.current_credential().await {
            Ok(credential) => self.ensure_valid_credential(credential, options).await,
            Err(err) => {
                warn!(code = err.error_code(), "Failed to fetch current credential: {}", err);
                ValidationResult::invalid(err)
            }
        }
    }

    /// Refresh unconditionally, with backoff.
    ///
    /// Callers refreshing the same credential concurrently share one
    /// underlying refresh and all receive its result.
    pub async fn refresh_credential(
        &self,
        credential: &Credential,
        options: &RetryOptions,
    ) -> ValidationResult {
        let key = credential.refresh_token().to_string();

        let refresh = {
            let mut in_flight = lock(&self.in_flight);
            if let Some((_, pending)) = in_flight.refreshes.get(&key) {
                debug!(
                    principal_id = credential.principal().id(),
                    "Joining in-flight credential refresh"
                );
                pending.clone()
            } else {
                let id = in_flight.next_id;
                in_flight.next_id += 1;

                let attempt = refresh_with_backoff(
                    Arc::clone(&self.provider),
                    Arc::clone(&self.sleeper),
                    in_flight.cancel.clone(),
                    credential.clone(),
                    options.clone(),
                );
                let registry = Arc::downgrade(&self.in_flight);
                let forget_key = key.clone();
                let refresh = async move {
                    let result = attempt.await;
                    forget(&registry, &forget_key, id);
                    result
                }
                .boxed()
                .shared();

                in_flight.refreshes.insert(key, (id, refresh.clone()));
                refresh
            }
        };

        refresh.await
    }

    /// Abort every pending refresh. Aborted refreshes resolve to
    /// [`AuthError::Cancelled`]; later refreshes start fresh.
    pub fn cancel_in_flight(&self) {
        let mut in_flight = lock(&self.in_flight);
        in_flight.cancel.cancel();
        in_flight.cancel = CancellationToken::new();
        let pending = in_flight.refreshes.len();
        in_flight.refreshes.clear();
        if pending > 0 {
            info!(pending, "Cancelled in-flight credential refreshes");
        }
    }
}

impl std::fmt::Debug for CredentialValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialValidator")
            .field("expiry_buffer", &self.expiry_buffer)
            .finish_non_exhaustive()
    }
}

fn forget(registry: &Weak<Mutex<InFlight>>, key: &str, id: u64) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let mut in_flight = lock(&registry);
    // A newer refresh may already own the slot after a cancel.
    if matches!(in_flight.refreshes.get(key), Some((current, _)) if *current == id) {
        in_flight.refreshes.remove(key);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "provider panicked during refresh".to_string()
    }
}

async fn refresh_with_backoff(
    provider: Arc<dyn AuthProviderClient>,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    credential: Credential,
    options: RetryOptions,
) -> ValidationResult {
    let max_retries = options.max_retries();
    let mut last_error: Option<AuthError> = None;
    let mut unknown_retried = false;

    for attempt in 0..max_retries {
        if cancel.is_cancelled() {
            return ValidationResult::invalid(AuthError::Cancelled);
        }

        debug!(attempt = attempt + 1, max_retries, "Refreshing credential");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ValidationResult::invalid(AuthError::Cancelled),
            outcome = AssertUnwindSafe(provider.refresh(&credential)).catch_unwind() => outcome,
        };

        let err = match outcome {
            Ok(Ok(fresh)) => {
                info!(principal_id = fresh.principal().id(), "Credential refresh succeeded");
                return ValidationResult::valid(fresh);
            }
            Ok(Err(err)) => err,
            Err(payload) => AuthError::Unknown {
                message: panic_message(payload.as_ref()),
            },
        };

        warn!(
            attempt = attempt + 1,
            code = err.error_code(),
            "Credential refresh failed: {}",
            err
        );

        let retry = match err {
            AuthError::Unknown { .. } => !std::mem::replace(&mut unknown_retried, true),
            ref other => other.is_retryable(),
        };
        last_error = Some(err);
        if !retry {
            break;
        }

        if attempt + 1 < max_retries {
            let delay = options.delay_for_attempt(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before next refresh attempt");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ValidationResult::invalid(AuthError::Cancelled),
                _ = sleeper.sleep(delay) => {}
            }
        }
    }

    let err = last_error.unwrap_or_else(|| AuthError::Authentication {
        status: Some(401),
        message: "failed to renew session".to_string(),
    });
    error!(code = err.error_code(), "Giving up on credential refresh: {}", err);
    ValidationResult::invalid(err)
}
