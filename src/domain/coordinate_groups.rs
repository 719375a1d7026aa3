//! Two-level keyed view of coordinate rows.
//!
//! `coordinates` responses are shaped as `geom_id -> epoch millis -> record`
//! so clients can merge successive windows by key:
//!
//! ```json
//! { "12": { "1704067200000": { "geom_id": 12, "time": 1704067200000, ... } } }
//! ```
//!
//! Stored times carry microseconds. Sub-millisecond parts are kept as a
//! fractional millisecond (`"1704067200000.4"`), so distinct rows never
//! share a key.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::persistence::models::Coordinate;

/// A timestamp as epoch milliseconds, stored at microsecond resolution.
///
/// Serializes as an integer when it falls on a whole millisecond and as a
/// fractional number otherwise. [`fmt::Display`] gives the map-key form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpochMillis(i64);

impl EpochMillis {
    const fn is_whole(self) -> bool {
        self.0 % 1000 == 0
    }
}

impl From<DateTime<Utc>> for EpochMillis {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t.timestamp_micros())
    }
}

impl fmt::Display for EpochMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let (millis, micros) = (abs / 1000, abs % 1000);
        if micros == 0 {
            return write!(f, "{sign}{millis}");
        }
        let frac = format!("{micros:03}");
        write!(f, "{sign}{millis}.{}", frac.trim_end_matches('0'))
    }
}

impl Serialize for EpochMillis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_whole() {
            serializer.serialize_i64(self.0 / 1000)
        } else {
            serializer.serialize_f64(self.0 as f64 / 1000.0)
        }
    }
}

/// One coordinate as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateRecord {
    /// Owning geometry.
    pub geom_id: i32,
    /// Sample time in epoch milliseconds.
    pub time: EpochMillis,
    /// Emitting device.
    pub device_id: String,
    /// Device assignment at capture time.
    pub assignment_id: Option<String>,
    /// Position payload. Missing components are `null`.
    pub coordinates: Vec<Option<f64>>,
}

impl From<Coordinate> for CoordinateRecord {
    fn from(c: Coordinate) -> Self {
        Self {
            geom_id: c.geom_id,
            time: EpochMillis::from(c.time),
            device_id: c.device_id,
            assignment_id: c.assignment_id,
            coordinates: c.coordinates,
        }
    }
}

/// Coordinates grouped by geometry, then by timestamp.
///
/// Both levels are ordered maps, so iteration (and serialization) is by
/// ascending geometry id and ascending time, and a `(geom_id, time)` pair
/// can appear at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateGroups(BTreeMap<i32, BTreeMap<EpochMillis, CoordinateRecord>>);

impl CoordinateGroups {
    /// Groups rows fetched for a single device.
    ///
    /// If two rows share a `(geom_id, time)` key the later one wins.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = Coordinate>) -> Self {
        let mut groups: BTreeMap<i32, BTreeMap<EpochMillis, CoordinateRecord>> = BTreeMap::new();
        for row in rows {
            let record = CoordinateRecord::from(row);
            groups
                .entry(record.geom_id)
                .or_default()
                .insert(record.time, record);
        }
        Self(groups)
    }

    /// Returns the number of geometries with at least one record.
    #[must_use]
    pub fn geometry_count(&self) -> usize {
        self.0.len()
    }

    /// Returns the total number of records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}

impl Serialize for CoordinateGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut outer = serializer.serialize_map(Some(self.0.len()))?;
        for (geom_id, records) in &self.0 {
            outer.serialize_entry(geom_id, &ByTime(records))?;
        }
        outer.end()
    }
}

struct ByTime<'a>(&'a BTreeMap<EpochMillis, CoordinateRecord>);

impl Serialize for ByTime<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (time, record) in self.0 {
            map.serialize_entry(&time.to_string(), record)?;
        }
        map.end()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};

    fn t0() -> DateTime<Utc> {
        let Some(t) = DateTime::from_timestamp(1_704_067_200, 0) else {
            panic!("valid timestamp");
        };
        t
    }

    fn row_at(geom_id: i32, time: DateTime<Utc>, x: f64) -> Coordinate {
        Coordinate {
            time,
            device_id: "D1".to_string(),
            assignment_id: Some("A1".to_string()),
            geom_id,
            coordinates: vec![Some(x), None],
        }
    }

    fn row(geom_id: i32, offset_secs: i64, x: f64) -> Coordinate {
        row_at(geom_id, t0() + TimeDelta::seconds(offset_secs), x)
    }

    fn keys(json: &serde_json::Value, geom_id: &str) -> Vec<String> {
        json[geom_id]
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn groups_by_geometry_then_time() {
        let groups = CoordinateGroups::from_rows(vec![row(2, 1, 0.5), row(1, 2, 1.0), row(1, 0, 2.0)]);

        assert_eq!(groups.geometry_count(), 2);
        assert_eq!(groups.record_count(), 3);
        let json = serde_json::to_value(&groups).unwrap_or_default();
        assert_eq!(keys(&json, "1"), vec!["1704067200000", "1704067202000"]);
        assert_eq!(keys(&json, "2"), vec!["1704067201000"]);
    }

    #[test]
    fn duplicate_key_collapses() {
        let groups = CoordinateGroups::from_rows(vec![row(1, 0, 1.0), row(1, 0, 9.0)]);
        assert_eq!(groups.record_count(), 1);
        let json = serde_json::to_value(&groups).unwrap_or_default();
        assert_eq!(
            json["1"]["1704067200000"]["coordinates"],
            serde_json::json!([9.0, null])
        );
    }

    #[test]
    fn sub_millisecond_rows_stay_distinct() {
        let later = t0() + TimeDelta::microseconds(400);
        let groups = CoordinateGroups::from_rows(vec![row_at(1, t0(), 1.0), row_at(1, later, 2.0)]);

        assert_eq!(groups.record_count(), 2);
        let json = serde_json::to_value(&groups).unwrap_or_default();
        assert_eq!(keys(&json, "1"), vec!["1704067200000", "1704067200000.4"]);
        assert_eq!(json["1"]["1704067200000.4"]["time"], 1_704_067_200_000.4_f64);
        assert_eq!(json["1"]["1704067200000"]["time"], 1_704_067_200_000_i64);
    }

    #[test]
    fn epoch_millis_display() {
        let at = |micros: i64| EpochMillis(micros).to_string();
        assert_eq!(at(1_500_000), "1500");
        assert_eq!(at(1_500_250), "1500.25");
        assert_eq!(at(1_500_007), "1500.007");
        assert_eq!(at(-400), "-0.4");
        assert_eq!(EpochMillis::from(t0()), EpochMillis(1_704_067_200_000_000));
    }

    #[test]
    fn serializes_as_nested_object() {
        let groups = CoordinateGroups::from_rows(vec![row(7, 0, 1.5)]);
        let json = serde_json::to_value(&groups).unwrap_or_default();
        assert_eq!(json["7"]["1704067200000"]["geom_id"], 7);
        assert_eq!(json["7"]["1704067200000"]["time"], 1_704_067_200_000_i64);
        assert_eq!(
            json["7"]["1704067200000"]["coordinates"],
            serde_json::json!([1.5, null])
        );
    }

    #[test]
    fn empty_rows_serialize_to_empty_object() {
        let groups = CoordinateGroups::from_rows(Vec::new());
        assert_eq!(groups.record_count(), 0);
        assert_eq!(
            serde_json::to_value(&groups).unwrap_or_default(),
            serde_json::json!({})
        );
    }
}
