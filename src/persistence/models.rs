//! Database models for samples, geometries and coordinates.
//!
//! Rows are written by an external ingestion process and never modified
//! here. Most columns are nullable in the store, hence the `Option`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sample status that makes a sample visible to clients.
pub const STATUS_SUCCESS: &str = "success";

/// A row from the `samples` table: one recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sample {
    /// Auto-increment row ID. Higher means more recently created.
    pub id: i32,
    /// Recording start.
    pub start_time: DateTime<Utc>,
    /// Recording end.
    pub end_time: Option<DateTime<Utc>>,
    /// Capture frame rate.
    pub frames_per_second: Option<i32>,
    /// Number of frames captured.
    pub num_frames: Option<i32>,
    /// Frame width in pixels.
    pub frame_width: Option<i32>,
    /// Frame height in pixels.
    pub frame_height: Option<i32>,
    /// Environment the sample was recorded in.
    pub environment_id: String,
    /// Source identifier.
    pub source_id: Option<String>,
    /// Source kind (e.g. `"cuwb"`, `"pose"`).
    pub source_type: Option<String>,
    /// Source display name.
    pub source_name: Option<String>,
    /// Ingestion status; only `"success"` samples are served.
    pub status: String,
    /// Inference run the sample was derived from.
    pub inference_id: Option<String>,
    /// Inference display name.
    pub inference_name: Option<String>,
    /// Inference model.
    pub inference_model: Option<String>,
    /// Inference model version.
    pub inference_version: Option<String>,
}

/// A row from the `geoms` table: one tracked object within a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Geometry {
    /// Auto-increment row ID.
    pub id: i32,
    /// Owning sample.
    pub sample_id: i32,
    /// External identifier, unique per sample.
    pub uuid: Option<String>,
    /// Free-form render attributes.
    pub attributes: Option<serde_json::Value>,
    /// Geometry kind.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub geom_type: Option<String>,
    /// Tracked object identifier.
    pub object_id: Option<String>,
    /// Tracked object kind.
    pub object_type: Option<String>,
    /// Tracked object display name.
    pub object_name: Option<String>,
}

/// A row from the `coordinates` table: one timestamped position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coordinate {
    /// Sample time.
    pub time: DateTime<Utc>,
    /// Emitting device.
    pub device_id: String,
    /// Device assignment at capture time.
    pub assignment_id: Option<String>,
    /// Owning geometry.
    pub geom_id: i32,
    /// Position payload. `NaN` values are stored as `NULL`.
    pub coordinates: Vec<Option<f64>>,
}
