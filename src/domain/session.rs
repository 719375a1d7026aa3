//! Per-connection session state machine.
//!
//! ```text
//!   Unauthenticated ──valid credential──► Authenticated
//!         │   ▲                              │   ▲
//!         │   └── invalid credential          │   └── valid / invalid credential
//!         │                                   │
//!         └──────────── transport close ──────┴──► Closed
//! ```
//!
//! A [`Session`] is owned by the connection task. The authentication state
//! and identity are only changed through [`Session::authenticate`] and
//! [`Session::close`]; the liveness flag only through
//! [`Session::heartbeat`].

use std::sync::Arc;

use super::{ConnectionHandle, ConnectionId};
use crate::auth::Identity;
use crate::error::StreamError;
use crate::ws::messages::events;

/// Authentication lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state. Only `ping` and `auth` are accepted.
    Unauthenticated,
    /// A credential has been accepted. All events are accepted.
    Authenticated,
    /// Transport closed. Terminal.
    Closed,
}

/// State record for one connection.
#[derive(Debug)]
pub struct Session {
    handle: Arc<ConnectionHandle>,
    state: SessionState,
    identity: Option<Identity>,
}

impl Session {
    /// Creates an unauthenticated session bound to a registry handle.
    #[must_use]
    pub fn new(handle: Arc<ConnectionHandle>) -> Self {
        Self {
            handle,
            state: SessionState::Unauthenticated,
            identity: None,
        }
    }

    /// Returns the connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` while in [`SessionState::Authenticated`].
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Returns `true` once the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Returns the identity subject for log fields, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.subject.as_str())
    }

    /// Records a liveness proof. Never changes the authentication state.
    ///
    /// Returns `false` (and does nothing) once the session is closed.
    pub fn heartbeat(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.handle.mark_alive();
        true
    }

    /// Applies an accepted credential.
    ///
    /// Moves `Unauthenticated` to `Authenticated`; an already authenticated
    /// session keeps its state and takes the new identity. Returns `false`
    /// once the session is closed.
    pub fn authenticate(&mut self, identity: Identity) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = SessionState::Authenticated;
        self.identity = Some(identity);
        true
    }

    /// Checks whether `event` may be handled in the current state.
    ///
    /// `ping` and `auth` are always allowed on an open session.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Unauthorized`] for any other event before a
    /// credential has been accepted, and for every event after close.
    pub fn authorize(&self, event: &str) -> Result<(), StreamError> {
        match self.state {
            SessionState::Closed => Err(StreamError::Unauthorized),
            SessionState::Authenticated => Ok(()),
            SessionState::Unauthenticated if is_exempt(event) => Ok(()),
            SessionState::Unauthenticated => Err(StreamError::Unauthorized),
        }
    }

    /// Moves the session to [`SessionState::Closed`] and drops the identity.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.identity = None;
    }
}

/// Events that never require authentication.
fn is_exempt(event: &str) -> bool {
    event == events::PING || event == events::AUTH
}
