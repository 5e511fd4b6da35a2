//! Configuration types.
//!
//! Both configs use the builder pattern and can be loaded from environment
//! variables. Unparseable values are reported, never silently replaced.
//!
//! # Example
//!
//! ```ignore
//! use session_core::config::SessionConfig;
//!
//! let config = SessionConfig::from_env()?
//!     .with_expiry_buffer(Duration::from_secs(120));
//! ```

use std::str::FromStr;
use std::time::Duration;

use crate::auth::{RetryOptions, DEFAULT_EXPIRY_BUFFER};
use crate::error::{SessionError, SessionResult};

pub const ENV_MAX_RETRIES: &str = "SESSION_CORE_MAX_RETRIES";
pub const ENV_INITIAL_DELAY_MS: &str = "SESSION_CORE_INITIAL_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "SESSION_CORE_MAX_DELAY_MS";
pub const ENV_EXPIRY_BUFFER_SECS: &str = "SESSION_CORE_EXPIRY_BUFFER_SECS";
pub const ENV_AUTH_URL: &str = "SESSION_CORE_AUTH_URL";
pub const ENV_API_KEY: &str = "SESSION_CORE_API_KEY";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SESSION_CORE_REQUEST_TIMEOUT_SECS";

/// Storage key the HTTP provider persists its credential under.
pub const DEFAULT_STORAGE_KEY: &str = "session-core.auth-token";

fn env_parse<T: FromStr>(key: &str) -> SessionResult<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SessionError::InvalidConfig {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration for the session store and its validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backoff used for every refresh the store triggers
    pub retry: RetryOptions,
    /// Tokens expiring within this window count as expired (default: 60s)
    pub expiry_buffer: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryOptions::default(),
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Load from `SESSION_CORE_*` variables, defaulting whatever is unset.
    ///
    /// # Errors
    /// [`SessionError::InvalidConfig`] for unparseable values and
    /// [`SessionError::InvalidRetryOptions`] if the combination is malformed.
    pub fn from_env() -> SessionResult<Self> {
        let defaults = RetryOptions::default();
        let max_retries = env_parse::<u32>(ENV_MAX_RETRIES)?.unwrap_or(defaults.max_retries());
        let initial_delay = env_parse::<u64>(ENV_INITIAL_DELAY_MS)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay());
        let max_delay = env_parse::<u64>(ENV_MAX_DELAY_MS)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay());
        let expiry_buffer = env_parse::<u64>(ENV_EXPIRY_BUFFER_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_EXPIRY_BUFFER);

        Ok(Self {
            retry: RetryOptions::new(max_retries, initial_delay, max_delay)?,
            expiry_buffer,
        })
    }
}

/// Configuration for [`HttpAuthProvider`](crate::adapters::HttpAuthProvider).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Auth endpoint root, e.g. `https://project.example.co/auth/v1`
    pub base_url: String,
    /// Public API key sent as the `apikey` header
    pub api_key: String,
    /// Key the current credential is stored under
    pub storage_key: String,
    /// Per-request timeout (default: 10s)
    pub request_timeout: Duration,
    /// Buffer of the credential event channel (default: 64)
    pub event_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            request_timeout: Duration::from_secs(10),
            event_capacity: 64,
        }
    }
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Whether both the URL and the API key are present.
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// Load from `SESSION_CORE_AUTH_URL`, `SESSION_CORE_API_KEY` and
    /// `SESSION_CORE_REQUEST_TIMEOUT_SECS`.
    ///
    /// Missing URL or key is not an error: the resulting provider simply
    /// reports itself as not configured.
    pub fn from_env() -> SessionResult<Self> {
        let mut config = Self::new(
            std::env::var(ENV_AUTH_URL).unwrap_or_default(),
            std::env::var(ENV_API_KEY).unwrap_or_default(),
        );
        if let Some(secs) = env_parse::<u64>(ENV_REQUEST_TIMEOUT_SECS)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}
