//! WebSocket layer: upgrade handler, per-connection loop, dispatch and
//! liveness sweeping.
//!
//! The endpoint (default `/ws`) does not authenticate at upgrade time;
//! clients authenticate per connection with the `auth` event.

pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod messages;
pub mod sweeper;
