//! WebSocket message types: frame envelope, event names and payloads.
//!
//! Every frame in both directions is a JSON text message of the form
//! `{"event": <string>, "data": <any>}`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StreamError;
use crate::persistence::CoordinateScope;

/// Reserved event names.
pub mod events {
    /// Client → Server liveness proof.
    pub const PING: &str = "ping";
    /// Server → Client reply to `ping`, echoing its data.
    pub const PONG: &str = "pong";
    /// Client → Server credential.
    pub const AUTH: &str = "auth";
    /// Server → Client credential accepted.
    pub const AUTHORIZED: &str = "authorized";
    /// Server → Client credential rejected.
    pub const AUTH_FAILED: &str = "auth_failed";
    /// Client → Server geometry request.
    pub const GET_GEOMS: &str = "getGeoms";
    /// Server → Client geometry response.
    pub const GEOMS: &str = "geoms";
    /// Client → Server coordinate window request.
    pub const GET_COORDINATES: &str = "getCoordinates";
    /// Server → Client coordinate window response.
    pub const COORDINATES: &str = "coordinates";
    /// Server → Client error report.
    pub const ERROR: &str = "error";
}

/// Inbound frame envelope. A missing `data` decodes as `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl InboundFrame {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MalformedFrame`] if `text` is not a JSON
    /// object with a string `event` field.
    pub fn parse(text: &str) -> Result<Self, StreamError> {
        serde_json::from_str(text).map_err(|e| StreamError::MalformedFrame(e.to_string()))
    }
}

/// Outbound frame envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    /// Event name, one of [`events`].
    pub event: &'static str,
    /// Event payload.
    pub data: serde_json::Value,
}

impl OutboundFrame {
    /// Creates a frame from an already serialized payload.
    #[must_use]
    pub const fn new(event: &'static str, data: serde_json::Value) -> Self {
        Self { event, data }
    }

    /// Creates a frame by serializing `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Internal`] if `payload` cannot be serialized.
    pub fn with_payload<T: Serialize>(event: &'static str, payload: &T) -> Result<Self, StreamError> {
        let data = serde_json::to_value(payload).map_err(|e| StreamError::Internal(e.to_string()))?;
        Ok(Self::new(event, data))
    }

    /// Serializes the frame to its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Internal`] if serialization fails.
    pub fn to_text(&self) -> Result<String, StreamError> {
        serde_json::to_string(self).map_err(|e| StreamError::Internal(e.to_string()))
    }
}

/// `auth` payload. The credential is read from `Authorization`, or `token`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    /// Bearer credential, with or without the `Bearer ` prefix.
    #[serde(rename = "Authorization", alias = "authorization", alias = "token")]
    pub credential: String,
}

/// `getGeoms` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct GetGeomsPayload {
    /// Environment to resolve the sample in.
    pub environment_id: String,
    /// Calendar day (`YYYY-MM-DD`, UTC).
    pub date: NaiveDate,
}

/// `getCoordinates` payload.
///
/// Either `sample_id` or `geom_id` must be present; `geom_id` narrows the
/// window to one geometry.
#[derive(Debug, Clone, Deserialize)]
pub struct GetCoordinatesPayload {
    /// Sample whose geometries are scanned.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub sample_id: Option<i32>,
    /// Single geometry to scan instead of the whole sample.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub geom_id: Option<i32>,
    /// Emitting device.
    pub device_id: String,
    /// Window start.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub from: DateTime<Utc>,
    /// Window length override in seconds.
    #[serde(default)]
    pub seconds: Option<u64>,
}

/// A `getCoordinates` request with its row set resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatesRequest {
    /// Rows to scan; `geom_id` wins over `sample_id`.
    pub scope: CoordinateScope,
    /// Emitting device.
    pub device_id: String,
    /// Window start.
    pub from: DateTime<Utc>,
    /// Window length override in seconds.
    pub seconds: Option<u64>,
}

impl TryFrom<GetCoordinatesPayload> for CoordinatesRequest {
    type Error = StreamError;

    fn try_from(p: GetCoordinatesPayload) -> Result<Self, Self::Error> {
        let scope = p
            .geom_id
            .map(CoordinateScope::Geom)
            .or_else(|| p.sample_id.map(CoordinateScope::Sample))
            .ok_or_else(|| {
                StreamError::MalformedFrame(
                    "getCoordinates requires sample_id or geom_id".to_string(),
                )
            })?;
        Ok(Self {
            scope,
            device_id: p.device_id,
            from: p.from,
            seconds: p.seconds,
        })
    }
}

/// Decoded client event.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Liveness proof; the payload is echoed back verbatim.
    Ping(serde_json::Value),
    /// Credential presentation.
    Auth(AuthPayload),
    /// Geometry request.
    GetGeoms(GetGeomsPayload),
    /// Coordinate window request.
    GetCoordinates(CoordinatesRequest),
    /// Any other event name.
    Unknown(String),
}

impl TryFrom<InboundFrame> for ClientEvent {
    type Error = StreamError;

    fn try_from(frame: InboundFrame) -> Result<Self, Self::Error> {
        let InboundFrame { event, data } = frame;
        let event = match event.as_str() {
            events::PING => Self::Ping(data),
            events::AUTH => Self::Auth(payload(&event, data)?),
            events::GET_GEOMS => Self::GetGeoms(payload(&event, data)?),
            events::GET_COORDINATES => {
                let p: GetCoordinatesPayload = payload(&event, data)?;
                Self::GetCoordinates(CoordinatesRequest::try_from(p)?)
            }
            _ => Self::Unknown(event),
        };
        Ok(event)
    }
}

fn payload<T: for<'de> Deserialize<'de>>(
    event: &str,
    data: serde_json::Value,
) -> Result<T, StreamError> {
    serde_json::from_value(data)
        .map_err(|e| StreamError::MalformedFrame(format!("{event} payload: {e}")))
}

/// Accepts an id as a JSON number or a numeric string.
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i32),
        Str(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Int(id)) => Ok(Some(id)),
        Some(RawId::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid id {s:?}"))),
    }
}

/// Accepts an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// timestamp taken as UTC, or epoch milliseconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Millis(i64),
        Text(String),
    }

    match RawTime::deserialize(deserializer)? {
        RawTime::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp {ms} out of range"))),
        RawTime::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f"))
                    .map(|t| t.and_utc())
            })
            .map_err(|_| serde::de::Error::custom(format!("invalid timestamp {s:?}"))),
    }
}
