//! Domain layer: connection identity, session state, and liveness tracking.
//!
//! This module contains the per-connection state machine, the shared
//! registry of open connections used by the liveness sweeper, and the
//! keyed coordinate grouping returned to clients.

pub mod connection_id;
pub mod connection_registry;
pub mod coordinate_groups;
pub mod session;

pub use connection_id::ConnectionId;
pub use connection_registry::{ConnectionHandle, ConnectionRegistry};
pub use coordinate_groups::CoordinateGroups;
pub use session::{Session, SessionState};
