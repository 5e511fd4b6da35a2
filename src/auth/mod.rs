//! Credentials and credential validation.
//!
//! This module provides:
//! - The immutable [`Credential`] and its owning [`Principal`]
//! - [`CredentialValidator`]: expiry checks and refresh with exponential backoff

pub mod credential;
pub mod validator;

pub use credential::{Credential, Principal, SignInInput};
pub use validator::{CredentialValidator, RetryOptions, ValidationResult, DEFAULT_EXPIRY_BUFFER};
