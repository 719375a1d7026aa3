//! Geometry service: resolves samples and windows coordinates.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use crate::domain::CoordinateGroups;
use crate::error::StreamError;
use crate::persistence::models::{Geometry, Sample};
use crate::persistence::{CoordinateScope, QueryGateway};

/// Payload of a `geoms` response.
///
/// `sample` is `null` and `geoms` empty when no successful sample exists
/// for the requested environment and day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeomsSnapshot {
    /// Resolved sample.
    pub sample: Option<Sample>,
    /// Geometries owned by the sample, ordered by id.
    pub geoms: Vec<Geometry>,
}

/// Stateless coordinator over a [`QueryGateway`].
///
/// Holds the default coordinate window and the largest window a client may
/// request.
#[derive(Debug, Clone)]
pub struct GeomService {
    gateway: Arc<dyn QueryGateway>,
    default_window: TimeDelta,
    max_window: TimeDelta,
}

impl GeomService {
    /// Creates a new `GeomService`.
    ///
    /// `max_window_secs` is raised to `default_window_secs` if smaller.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn QueryGateway>,
        default_window_secs: u64,
        max_window_secs: u64,
    ) -> Self {
        let default_secs = i64::try_from(default_window_secs).unwrap_or(i64::MAX / 1000);
        let max_secs = i64::try_from(max_window_secs)
            .unwrap_or(i64::MAX / 1000)
            .max(default_secs);
        Self {
            gateway,
            default_window: TimeDelta::try_seconds(default_secs).unwrap_or(TimeDelta::MAX),
            max_window: TimeDelta::try_seconds(max_secs).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Resolves the latest successful sample for an environment and day and
    /// loads its geometries.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] if either query fails.
    pub async fn geoms_for_day(
        &self,
        environment_id: &str,
        date: NaiveDate,
    ) -> Result<GeomsSnapshot, StreamError> {
        let Some(sample) = self
            .gateway
            .fetch_latest_successful_sample(environment_id, date)
            .await?
        else {
            tracing::debug!(environment_id, %date, "no successful sample for day");
            return Ok(GeomsSnapshot::default());
        };

        let geoms = self.gateway.fetch_geoms(sample.id).await?;
        tracing::debug!(
            environment_id,
            %date,
            sample_id = sample.id,
            geoms = geoms.len(),
            "resolved geoms"
        );
        Ok(GeomsSnapshot {
            sample: Some(sample),
            geoms,
        })
    }

    /// Fetches one device's coordinates for `scope` starting at `from` and
    /// groups them by geometry and timestamp.
    ///
    /// `window_secs` overrides the default window and is capped at the
    /// configured maximum.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Storage`] if the query fails.
    pub async fn coordinates_window(
        &self,
        scope: CoordinateScope,
        device_id: &str,
        from: DateTime<Utc>,
        window_secs: Option<u64>,
    ) -> Result<CoordinateGroups, StreamError> {
        let window = self.window(window_secs);
        let rows = self
            .gateway
            .fetch_coordinates_in_window(scope, device_id, from, window)
            .await?;
        let rows_fetched = rows.len();
        let groups = CoordinateGroups::from_rows(rows);
        tracing::debug!(
            %scope,
            device_id,
            %from,
            window_secs = window.num_seconds(),
            rows = rows_fetched,
            geometries = groups.geometry_count(),
            records = groups.record_count(),
            "fetched coordinate window"
        );
        Ok(groups)
    }

    fn window(&self, requested_secs: Option<u64>) -> TimeDelta {
        requested_secs
            .and_then(|s| i64::try_from(s).ok())
            .and_then(TimeDelta::try_seconds)
            .map_or(self.default_window, |w| w.min(self.max_window))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryGateway;
    use crate::persistence::models::{Coordinate, STATUS_SUCCESS};

    fn day() -> NaiveDate {
        let Some(d) = NaiveDate::from_ymd_opt(2024, 1, 1) else {
            panic!("valid date");
        };
        d
    }

    fn t0() -> DateTime<Utc> {
        let Some(t) = day().and_hms_opt(9, 30, 0) else {
            panic!("valid time");
        };
        t.and_utc()
    }

    fn sample(id: i32, status: &str) -> Sample {
        Sample {
            id,
            start_time: t0(),
            end_time: None,
            frames_per_second: None,
            num_frames: None,
            frame_width: None,
            frame_height: None,
            environment_id: "E1".to_string(),
            source_id: None,
            source_type: None,
            source_name: None,
            status: status.to_string(),
            inference_id: None,
            inference_name: None,
            inference_model: None,
            inference_version: None,
        }
    }

    fn geom(id: i32, sample_id: i32) -> Geometry {
        Geometry {
            id,
            sample_id,
            uuid: None,
            attributes: Some(serde_json::json!({ "color": "red" })),
            geom_type: Some("point".to_string()),
            object_id: Some(format!("obj-{id}")),
            object_type: Some("person".to_string()),
            object_name: None,
        }
    }

    async fn service() -> (Arc<InMemoryGateway>, GeomService) {
        let store = Arc::new(InMemoryGateway::new());
        let ok = store.insert_sample(sample(5, "failed")).await.is_ok()
            && store.insert_sample(sample(7, STATUS_SUCCESS)).await.is_ok()
            && store.insert_geom(geom(1, 7)).await.is_ok()
            && store.insert_geom(geom(2, 5)).await.is_ok();
        if !ok {
            panic!("seeding failed");
        }
        let gateway: Arc<dyn QueryGateway> = Arc::clone(&store) as Arc<dyn QueryGateway>;
        (store, GeomService::new(gateway, 25, 60))
    }

    #[tokio::test]
    async fn resolves_successful_sample_not_failed_one() {
        let (_, svc) = service().await;
        let Ok(snapshot) = svc.geoms_for_day("E1", day()).await else {
            panic!("query failed");
        };
        let Some(sample) = snapshot.sample else {
            panic!("sample expected");
        };
        assert_eq!(sample.id, 7);
        assert_eq!(snapshot.geoms.len(), 1);
        assert_eq!(snapshot.geoms.first().map(|g| g.id), Some(1));
    }

    #[tokio::test]
    async fn unknown_environment_is_empty_not_error() {
        let (_, svc) = service().await;
        let Ok(snapshot) = svc.geoms_for_day("E404", day()).await else {
            panic!("query failed");
        };
        assert_eq!(snapshot, GeomsSnapshot::default());
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap_or_default(),
            serde_json::json!({ "sample": null, "geoms": [] })
        );
    }

    #[tokio::test]
    async fn window_defaults_and_caps() {
        let (store, svc) = service().await;
        for offset in [0, 25, 50, 70] {
            let row = Coordinate {
                time: t0() + TimeDelta::seconds(offset),
                device_id: "D1".to_string(),
                assignment_id: None,
                geom_id: 1,
                coordinates: vec![Some(0.0)],
            };
            if store.insert_coordinate(row).await.is_err() {
                panic!("insert failed");
            }
        }

        let Ok(default) = svc
            .coordinates_window(CoordinateScope::Sample(7), "D1", t0(), None)
            .await
        else {
            panic!("query failed");
        };
        assert_eq!(default.record_count(), 2);

        let Ok(capped) = svc
            .coordinates_window(CoordinateScope::Sample(7), "D1", t0(), Some(3600))
            .await
        else {
            panic!("query failed");
        };
        assert_eq!(capped.record_count(), 3);
    }

    #[test]
    fn max_window_never_below_default() {
        let gateway: Arc<dyn QueryGateway> = Arc::new(InMemoryGateway::new());
        let svc = GeomService::new(gateway, 30, 10);
        assert_eq!(svc.window(Some(3600)), TimeDelta::seconds(30));
        assert_eq!(svc.window(None), TimeDelta::seconds(30));
        assert_eq!(svc.window(Some(5)), TimeDelta::seconds(5));
    }
}
