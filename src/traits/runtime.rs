//! Time seams: wall clock and async sleep.
//!
//! Both are injected so expiry checks and backoff delays can be asserted
//! deterministically in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Suspends the current task.
///
/// Callers that need interruption race `sleep` against a cancellation token;
/// implementations only have to be cancel-safe (droppable mid-sleep).
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
