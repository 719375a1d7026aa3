//! # geom-stream
//!
//! WebSocket gateway that streams recorded geometries and time-windowed
//! coordinate samples to authenticated clients.
//!
//! Clients connect to `/ws`, authenticate with an `auth` event carrying a
//! bearer token, keep the connection alive with `ping`, and request data
//! with `getGeoms` and `getCoordinates`. All reads are delegated to a
//! [`persistence::QueryGateway`]; this crate owns only the session protocol.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP health)
//!     │
//!     ├── WS Handler + Connection loop (ws/)
//!     │       ├── Dispatcher ── Session state machine (domain/)
//!     │       └── ConnectionRegistry ◄── LivenessSweeper
//!     │
//!     ├── GeomService (service/)
//!     ├── AuthValidator (auth/)
//!     │
//!     └── QueryGateway: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
