//! Error handling for the session core.
//!
//! Two families, separated by how they propagate:
//!
//! - [`AuthError`]: expected failures of validation and refresh. Returned as
//!   data inside results, never panicked or bubbled with `?` past the store.
//! - [`SessionError`]: invalid arguments and configuration. Returned as `Err`.
//!
//! | Variant | Category | Retryable |
//! |---------|----------|-----------|
//! | NotConfigured | Configuration | No |
//! | Expired | Auth | Refresh instead |
//! | Network | Network | Yes |
//! | Authentication | Auth | No |
//! | Unknown | Server | Once |
//! | Cancelled | Client | No |

mod auth;
mod category;
mod session;

pub use auth::{AuthError, RETRYABLE_STATUSES};
pub use category::ErrorCategory;
pub use session::{SessionError, SessionResult};
