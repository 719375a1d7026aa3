//! Service layer: data retrieval on behalf of WebSocket requests.
//!
//! [`GeomService`] is the single entry point the dispatcher uses to reach
//! the [`crate::persistence::QueryGateway`].

pub mod geom_service;

pub use geom_service::{GeomService, GeomsSnapshot};
