//! Credential validation.
//!
//! The dispatcher suspends on exactly one [`AuthValidator::validate_credential`]
//! call per `auth` event and gets back either an [`Identity`] or an error.

pub mod jwt;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StreamError;

pub use jwt::JwtValidator;

/// Decoded identity of an authenticated client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Token subject (`sub` claim).
    pub subject: String,
    /// Token expiry, when the credential carries one.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Verifies bearer credentials.
#[async_trait]
pub trait AuthValidator: Send + Sync + fmt::Debug {
    /// Validates `token` and returns the identity it carries.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::AuthenticationFailed`] if the credential is
    /// malformed, expired, or fails signature or claim checks.
    async fn validate_credential(&self, token: &str) -> Result<Identity, StreamError>;
}

/// Strips an optional `Bearer ` scheme prefix from a credential.
#[must_use]
pub fn strip_bearer(credential: &str) -> &str {
    let trimmed = credential.trim();
    trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .map_or(trimmed, str::trim)
}
