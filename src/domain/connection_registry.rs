//! Registry of open connections shared with the liveness sweeper.
//!
//! [`ConnectionRegistry`] stores one [`ConnectionHandle`] per open
//! WebSocket. The handle carries only what the sweeper is allowed to touch:
//! the atomic liveness flag and the termination signal. Everything else
//! about a connection lives in its [`super::Session`], owned by the
//! connection task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};

use super::ConnectionId;

/// Shared, thread-safe view of one open connection.
///
/// The liveness flag is written by inbound pings (through
/// [`super::Session::heartbeat`]) and read-and-cleared by the sweeper, so
/// both sides go through atomics.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    opened_at: DateTime<Utc>,
    alive: AtomicBool,
    terminated: AtomicBool,
    terminate_signal: Notify,
}

impl ConnectionHandle {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            opened_at: Utc::now(),
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            terminate_signal: Notify::new(),
        }
    }

    /// Returns the connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns when the transport was upgraded.
    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Returns the current liveness flag.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns `true` once the sweeper has terminated this connection.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Clears the liveness flag and returns its previous value.
    pub(crate) fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Signals the connection task to abort the transport.
    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        // notify_one stores a permit, so a task that is not currently
        // waiting still observes the signal on its next poll.
        self.terminate_signal.notify_one();
    }

    /// Resolves once [`Self::terminate`] has been called.
    pub async fn terminated(&self) {
        if self.is_terminated() {
            return;
        }
        self.terminate_signal.notified().await;
    }
}

/// Set of all open connections.
///
/// Owned by the transport layer, injected into the
/// [`crate::ws::sweeper::LivenessSweeper`] at construction.
///
/// # Concurrency
///
/// The outer map sits behind a [`tokio::sync::RwLock`]; the sweeper takes a
/// snapshot of the handles and releases the lock before touching any of
/// them, so registration of new connections is never blocked by a sweep.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new connection and returns its handle.
    ///
    /// New connections start alive so they survive the first sweep.
    pub async fn register(&self) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(ConnectionId::new()));
        self.connections
            .write()
            .await
            .insert(handle.id(), Arc::clone(&handle));
        handle
    }

    /// Removes a connection, returning its handle if it was still present.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.write().await.remove(&id)
    }

    /// Returns the handle for `id`, if registered.
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Returns a point-in-time copy of all registered handles.
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Returns the number of open connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is open.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
