//! PostgreSQL implementation of the query gateway.
//!
//! All values reach the server as bind parameters; nothing client-supplied
//! is ever formatted into SQL text.
//!
//! Time columns are `TIMESTAMP` without time zone holding UTC. Queries
//! convert them with `AT TIME ZONE 'UTC'` when selecting and bind window
//! bounds as naive UTC, so the session time zone never shifts a value.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{Coordinate, Geometry, STATUS_SUCCESS, Sample};
use super::{CoordinateScope, QueryGateway};
use crate::config::StreamConfig;
use crate::error::StreamError;

const LATEST_SUCCESSFUL_SAMPLE_SQL: &str = "\
    SELECT id, start_time AT TIME ZONE 'UTC' AS start_time, \
           end_time AT TIME ZONE 'UTC' AS end_time, frames_per_second, num_frames, frame_width, frame_height, \
           environment_id, source_id, source_type, source_name, status, \
           inference_id, inference_name, inference_model, inference_version \
    FROM samples \
    WHERE environment_id = $1 \
      AND start_time::date = $2 \
      AND status = $3 \
    ORDER BY id DESC \
    LIMIT 1";

const GEOMS_FOR_SAMPLE_SQL: &str = "\
    SELECT id, sample_id, uuid, attributes, type, object_id, object_type, object_name \
    FROM geoms \
    WHERE sample_id = $1 \
    ORDER BY id ASC";

const COORDINATES_FOR_SAMPLE_SQL: &str = "\
    SELECT c.time AT TIME ZONE 'UTC' AS time, c.device_id, c.assignment_id, c.geom_id, \
           COALESCE(c.coordinates::float8[], '{}'::float8[]) AS coordinates \
    FROM coordinates c \
    JOIN geoms g ON c.geom_id = g.id \
    WHERE g.sample_id = $1 \
      AND c.device_id = $2 \
      AND c.time BETWEEN $3 AND $4 \
    ORDER BY c.geom_id, c.time ASC";

const COORDINATES_FOR_GEOM_SQL: &str = "\
    SELECT c.time AT TIME ZONE 'UTC' AS time, c.device_id, c.assignment_id, c.geom_id, \
           COALESCE(c.coordinates::float8[], '{}'::float8[]) AS coordinates \
    FROM coordinates c \
    WHERE c.geom_id = $1 \
      AND c.device_id = $2 \
      AND c.time BETWEEN $3 AND $4 \
    ORDER BY c.geom_id, c.time ASC";

/// PostgreSQL-backed gateway using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    /// Creates a new gateway over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from the configuration and, when
    /// `DATABASE_RUN_MIGRATIONS` is set, applies the bundled schema.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] if the database is unreachable or a
    /// migration fails.
    pub async fn connect(config: &StreamConfig) -> Result<Self, StreamError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        if config.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StreamError::Storage(e.to_string()))?;
            tracing::info!("database migrations applied");
        }

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl QueryGateway for PostgresGateway {
    async fn fetch_latest_successful_sample(
        &self,
        environment_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Sample>, StreamError> {
        let sample = sqlx::query_as::<_, Sample>(LATEST_SUCCESSFUL_SAMPLE_SQL)
            .bind(environment_id)
            .bind(date)
            .bind(STATUS_SUCCESS)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sample)
    }

    async fn fetch_geoms(&self, sample_id: i32) -> Result<Vec<Geometry>, StreamError> {
        let geoms = sqlx::query_as::<_, Geometry>(GEOMS_FOR_SAMPLE_SQL)
            .bind(sample_id)
            .fetch_all(&self.pool)
            .await?;
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

        let (sql, id) = match scope {
            CoordinateScope::Sample(id) => (COORDINATES_FOR_SAMPLE_SQL, id),
            CoordinateScope::Geom(id) => (COORDINATES_FOR_GEOM_SQL, id),
        };

        let rows = sqlx::query_as::<_, Coordinate>(sql)
            .bind(id)
            .bind(device_id)
            .bind(from.naive_utc())
            .bind(to.naive_utc())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COORDINATE_QUERIES: [&str; 2] = [COORDINATES_FOR_SAMPLE_SQL, COORDINATES_FOR_GEOM_SQL];

    #[test]
    fn naive_time_columns_are_read_as_utc() {
        assert!(LATEST_SUCCESSFUL_SAMPLE_SQL.contains("start_time AT TIME ZONE 'UTC' AS start_time"));
        assert!(LATEST_SUCCESSFUL_SAMPLE_SQL.contains("end_time AT TIME ZONE 'UTC' AS end_time"));
        for sql in COORDINATE_QUERIES {
            assert!(sql.contains("c.time AT TIME ZONE 'UTC' AS time"));
        }
    }

    #[test]
    fn filters_compare_against_the_stored_column() {
        assert!(LATEST_SUCCESSFUL_SAMPLE_SQL.contains("start_time::date = $2"));
        for sql in COORDINATE_QUERIES {
            assert!(sql.contains("c.time BETWEEN $3 AND $4"));
            assert!(sql.contains("ORDER BY c.geom_id, c.time ASC"));
        }
    }
}
