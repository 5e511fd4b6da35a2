//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_tracing`] once at startup.

use std::io;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crate-specific filter variable, checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "SESSION_CORE_LOG";

const DEFAULT_FILTER: &str = "info";

/// Build the filter from `SESSION_CORE_LOG`, then `RUST_LOG`, then `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr `fmt` subscriber.
///
/// Returns `false` if a global subscriber was already set, which makes a
/// second call harmless.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter())
        .try_init()
        .is_ok()
}
