//! In-memory implementation of the query gateway.
//!
//! Mirrors the PostgreSQL semantics (status filter, id tie-break, inclusive
//! window, `(geom_id, time)` ordering and the unique indexes) so the
//! protocol layer can run without a database.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tokio::sync::RwLock;

use super::models::{Coordinate, Geometry, STATUS_SUCCESS, Sample};
use super::{CoordinateScope, QueryGateway};
use crate::error::StreamError;

#[derive(Debug, Default)]
struct Tables {
    samples: Vec<Sample>,
    geoms: Vec<Geometry>,
    coordinates: Vec<Coordinate>,
}

/// Gateway over vectors guarded by a [`tokio::sync::RwLock`].
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    tables: RwLock<Tables>,
}

impl InMemoryGateway {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a sample.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] if the id is already taken.
    pub async fn insert_sample(&self, sample: Sample) -> Result<(), StreamError> {
        let mut tables = self.tables.write().await;
        if tables.samples.iter().any(|s| s.id == sample.id) {
            return Err(StreamError::Storage(format!(
                "duplicate sample id {}",
                sample.id
            )));
        }
        tables.samples.push(sample);
        Ok(())
    }

    /// Inserts a geometry.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] if the owning sample does not exist,
    /// the id is taken, or `(sample_id, uuid)` is not unique.
    pub async fn insert_geom(&self, geom: Geometry) -> Result<(), StreamError> {
        let mut tables = self.tables.write().await;
        if !tables.samples.iter().any(|s| s.id == geom.sample_id) {
            return Err(StreamError::Storage(format!(
                "geom {} references missing sample {}",
                geom.id, geom.sample_id
            )));
        }
        if tables.geoms.iter().any(|g| g.id == geom.id) {
            return Err(StreamError::Storage(format!("duplicate geom id {}", geom.id)));
        }
        if geom.uuid.is_some()
            && tables
                .geoms
                .iter()
                .any(|g| g.sample_id == geom.sample_id && g.uuid == geom.uuid)
        {
            return Err(StreamError::Storage(format!(
                "duplicate geom uuid in sample {}",
                geom.sample_id
            )));
        }
        tables.geoms.push(geom);
        Ok(())
    }

    /// Appends a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] if the owning geometry does not
    /// exist or `(device_id, geom_id, time)` is not unique.
    pub async fn insert_coordinate(&self, coordinate: Coordinate) -> Result<(), StreamError> {
        let mut tables = self.tables.write().await;
        if !tables.geoms.iter().any(|g| g.id == coordinate.geom_id) {
            return Err(StreamError::Storage(format!(
                "coordinate references missing geom {}",
                coordinate.geom_id
            )));
        }
        if tables.coordinates.iter().any(|c| {
            c.device_id == coordinate.device_id
                && c.geom_id == coordinate.geom_id
                && c.time == coordinate.time
        }) {
            return Err(StreamError::Storage(format!(
                "duplicate coordinate for device {} geom {} at {}",
                coordinate.device_id, coordinate.geom_id, coordinate.time
            )));
        }
        tables.coordinates.push(coordinate);
        Ok(())
    }

    /// Deletes a sample together with its geometries and their coordinates.
    ///
    /// Returns `false` if the sample did not exist.
    pub async fn delete_sample(&self, sample_id: i32) -> bool {
        let mut tables = self.tables.write().await;
        let before = tables.samples.len();
        tables.samples.retain(|s| s.id != sample_id);
        if tables.samples.len() == before {
            return false;
        }
        let removed: HashSet<i32> = tables
            .geoms
            .iter()
            .filter(|g| g.sample_id == sample_id)
            .map(|g| g.id)
            .collect();
        tables.geoms.retain(|g| g.sample_id != sample_id);
        tables
            .coordinates
            .retain(|c| !removed.contains(&c.geom_id));
        true
    }
}

#[async_trait]
impl QueryGateway for InMemoryGateway {
    async fn fetch_latest_successful_sample(
        &self,
        environment_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Sample>, StreamError> {
        let tables = self.tables.read().await;
        Ok(tables
            .samples
            .iter()
            .filter(|s| {
                s.environment_id == environment_id
                    && s.status == STATUS_SUCCESS
                    && s.start_time.date_naive() == date
            })
            .max_by_key(|s| s.id)
            .cloned())
    }

    async fn fetch_geoms(&self, sample_id: i32) -> Result<Vec<Geometry>, StreamError> {
        let tables = self.tables.read().await;
        let mut geoms: Vec<Geometry> = tables
            .geoms
            .iter()
            .filter(|g| g.sample_id == sample_id)
            .cloned()
            .collect();
        geoms.sort_by_key(|g| g.id);
        Ok(geoms)
    }

    async fn fetch_coordinates_in_window(
        &self,
        scope: CoordinateScope,
        device_id: &str,
        from: DateTime<Utc>,
        duration: TimeDelta,
    ) -> Result<Vec<Coordinate>, StreamError> {
        let to = from
            .checked_add_signed(duration)
            .ok_or_else(|| StreamError::Storage("coordinate window out of range".to_string()))?;

        let tables = self.tables.read().await;
        let geom_ids: HashSet<i32> = match scope {
            CoordinateScope::Sample(sample_id) => tables
                .geoms
                .iter()
                .filter(|g| g.sample_id == sample_id)
                .map(|g| g.id)
                .collect(),
            CoordinateScope::Geom(geom_id) => HashSet::from([geom_id]),
        };

        let mut rows: Vec<Coordinate> = tables
            .coordinates
            .iter()
            .filter(|c| {
                geom_ids.contains(&c.geom_id)
                    && c.device_id == device_id
                    && c.time >= from
                    && c.time <= to
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.geom_id, c.time));
        Ok(rows)
    }
}
