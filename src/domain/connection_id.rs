//! Connection identifier.

use std::fmt;

/// Identifier of one WebSocket connection, minted by
/// [`super::ConnectionRegistry::register`] when the transport is upgraded.
///
/// Ids are process-local and never received from clients. They key the
/// registry and tag every log line for the connection as `connection_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}
