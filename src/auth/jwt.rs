//! HS256 JWT validation with `jsonwebtoken`.

use async_trait::async_trait;
use chrono::DateTime;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use super::{AuthValidator, Identity, strip_bearer};
use crate::config::AuthConfig;
use crate::error::StreamError;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Validates HS256-signed tokens against a shared secret.
///
/// `exp` is required and checked with the configured leeway; `aud` and
/// `iss` are checked only when configured.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("key", &"<redacted>")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtValidator {
    /// Creates a validator from token settings.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.jwt_leeway_secs;
        match config.jwt_audience.as_deref() {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = config.jwt_issuer.as_deref() {
            validation.set_issuer(&[iss]);
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl AuthValidator for JwtValidator {
    async fn validate_credential(&self, token: &str) -> Result<Identity, StreamError> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(StreamError::AuthenticationFailed(
                "missing credential".to_string(),
            ));
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired".to_string(),
                ErrorKind::InvalidSignature => "invalid signature".to_string(),
                ErrorKind::InvalidAudience => "invalid audience".to_string(),
                ErrorKind::InvalidIssuer => "invalid issuer".to_string(),
                _ => e.to_string(),
            };
            StreamError::AuthenticationFailed(reason)
        })?;

        Ok(Identity {
            subject: data.claims.sub.unwrap_or_default(),
            expires_at: data
                .claims
                .exp
                .and_then(|exp| DateTime::from_timestamp(exp, 0)),
        })
    }
}
