//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::ConnectionRegistry;
use crate::ws::dispatcher::Dispatcher;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Frame dispatcher shared by every connection.
    pub dispatcher: Arc<Dispatcher>,
    /// Open connections, shared with the liveness sweeper.
    pub registry: Arc<ConnectionRegistry>,
}
