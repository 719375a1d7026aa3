//! Persistence layer: read-only access to samples, geometries and
//! coordinates.
//!
//! Provides the [`QueryGateway`] trait consumed by the service layer. The
//! PostgreSQL implementation uses `sqlx::PgPool` with bound parameters for
//! every query; the in-memory implementation backs tests and runs with
//! persistence disabled.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::error::StreamError;
use models::{Coordinate, Geometry, Sample};

pub use memory::InMemoryGateway;
pub use postgres::PostgresGateway;

/// Row set a coordinate window is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateScope {
    /// Every geometry owned by the sample.
    Sample(i32),
    /// A single geometry.
    Geom(i32),
}

impl fmt::Display for CoordinateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sample(id) => write!(f, "sample:{id}"),
            Self::Geom(id) => write!(f, "geom:{id}"),
        }
    }
}

/// Time-windowed reads against the geometry store.
///
/// Each call is a single independent read; no transaction spans calls.
#[async_trait]
pub trait QueryGateway: Send + Sync + fmt::Debug {
    /// Returns the most recently created sample with status `success` for
    /// `environment_id` whose start time falls on `date` (UTC).
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] on store failure.
    async fn fetch_latest_successful_sample(
        &self,
        environment_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Sample>, StreamError>;

    /// Returns all geometries owned by `sample_id`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] on store failure.
    async fn fetch_geoms(&self, sample_id: i32) -> Result<Vec<Geometry>, StreamError>;

    /// Returns the coordinates emitted by `device_id` for `scope` with
    /// `from <= time <= from + duration`, ordered by `(geom_id, time)`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] on store failure.
    async fn fetch_coordinates_in_window(
        &self,
        scope: CoordinateScope,
        device_id: &str,
        from: DateTime<Utc>,
        duration: TimeDelta,
    ) -> Result<Vec<Coordinate>, StreamError>;
}
