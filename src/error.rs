//! Stream error types with wire error-code mapping.
//!
//! [`StreamError`] is the central error type for the gateway. Errors raised
//! while handling a single frame never leave that connection: they are
//! either dropped (malformed frames) or converted into an outbound frame
//! with a numeric code via [`StreamError::to_frame`].

use serde::Serialize;

use crate::ws::messages::{OutboundFrame, events};

/// Error payload carried in the `data` field of `error` and `auth_failed`
/// frames.
///
/// ```json
/// { "message": "Unauthorized", "code": 4401 }
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Client-facing message. Never contains storage internals.
    pub message: String,
    /// Numeric error code.
    pub code: u32,
    /// Request event that produced the error, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

/// Gateway error enum with wire code mapping.
///
/// # Error Codes
///
/// | Code | Variant                 | Reported as            |
/// |------|-------------------------|------------------------|
/// | 4400 | `MalformedFrame`        | dropped, logged only   |
/// | 4401 | `Unauthorized`          | `error` frame          |
/// | 4403 | `AuthenticationFailed`  | `auth_failed` frame    |
/// | 4500 | `Storage`               | `error` frame          |
/// | 4501 | `Internal` / `Config`   | `error` frame          |
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Inbound payload does not match `{event, data}` or the event's payload.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Non-exempt event received before authentication succeeded.
    #[error("Unauthorized")]
    Unauthorized,

    /// Credential was rejected by the auth validator.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Query gateway failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or missing configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error (serialization and the like).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedFrame(_) => 4400,
            Self::Unauthorized => 4401,
            Self::AuthenticationFailed(_) => 4403,
            Self::Storage(_) => 4500,
            Self::Config(_) | Self::Internal(_) => 4501,
        }
    }

    /// Returns the message sent to the client for this variant.
    #[must_use]
    pub const fn client_message(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "Malformed frame",
            Self::Unauthorized => "Unauthorized",
            Self::AuthenticationFailed(_) => "Authentication failed",
            Self::Storage(_) => "Storage error",
            Self::Config(_) | Self::Internal(_) => "Internal error",
        }
    }

    /// Builds the client-facing error body.
    #[must_use]
    pub fn body(&self, event: Option<&str>) -> ErrorBody {
        ErrorBody {
            message: self.client_message().to_string(),
            code: self.error_code(),
            event: event.map(str::to_string),
        }
    }

    /// Converts the error into the outbound frame reported to the client.
    ///
    /// Authentication failures are reported as `auth_failed`; everything
    /// else as `error`.
    #[must_use]
    pub fn to_frame(&self, event: Option<&str>) -> OutboundFrame {
        let name = match self {
            Self::AuthenticationFailed(_) => events::AUTH_FAILED,
            _ => events::ERROR,
        };
        OutboundFrame::new(
            name,
            serde_json::to_value(self.body(event)).unwrap_or_default(),
        )
    }
}

impl From<sqlx::Error> for StreamError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_frame_matches_wire_shape() {
        let frame = StreamError::Unauthorized.to_frame(None);
        assert_eq!(frame.event, events::ERROR);
        assert_eq!(
            frame.data,
            serde_json::json!({ "message": "Unauthorized", "code": 4401 })
        );
    }

    #[test]
    fn auth_failure_uses_dedicated_event() {
        let frame = StreamError::AuthenticationFailed("expired".into()).to_frame(None);
        assert_eq!(frame.event, events::AUTH_FAILED);
        assert_eq!(frame.data["code"], 4403);
    }

    #[test]
    fn storage_error_hides_details_and_names_event() {
        let err = StreamError::Storage("relation \"samples\" does not exist".into());
        let frame = err.to_frame(Some("getGeoms"));
        assert_eq!(
            frame.data,
            serde_json::json!({ "message": "Storage error", "code": 4500, "event": "getGeoms" })
        );
    }

    #[test]
    fn error_codes_are_distinct_per_kind() {
        let codes = [
            StreamError::MalformedFrame(String::new()).error_code(),
            StreamError::Unauthorized.error_code(),
            StreamError::AuthenticationFailed(String::new()).error_code(),
            StreamError::Storage(String::new()).error_code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
