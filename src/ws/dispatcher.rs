//! Message dispatcher: routes one decoded frame to its handler.
//!
//! The dispatcher is transport-agnostic. It takes the raw text of one frame
//! and the connection's [`Session`], and returns the frame to send back (if
//! any). Domain failures (unauthorized, storage) come back as error frames;
//! only malformed input is returned as `Err`, so the connection loop can
//! log and count it separately.

use std::sync::Arc;

use super::messages::{
    AuthPayload, ClientEvent, CoordinatesRequest, GetGeomsPayload, InboundFrame, OutboundFrame,
    events,
};
use crate::auth::AuthValidator;
use crate::domain::Session;
use crate::error::StreamError;
use crate::service::GeomService;

/// Routes client events to the session state machine, the auth validator
/// and the geometry service.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    geom_service: Arc<GeomService>,
    auth: Arc<dyn AuthValidator>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    #[must_use]
    pub fn new(geom_service: Arc<GeomService>, auth: Arc<dyn AuthValidator>) -> Self {
        Self { geom_service, auth }
    }

    /// Handles one inbound text frame.
    ///
    /// Returns `Ok(None)` when nothing should be sent: unknown events on an
    /// authenticated session, and any frame on a closed session.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MalformedFrame`] if the frame is not a
    /// `{event, data}` object or its data does not fit the event. The frame
    /// is dropped; the session is unchanged.
    pub async fn dispatch(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<Option<OutboundFrame>, StreamError> {
        let connection_id = session.id();
        tracing::info!(%connection_id, payload = text, "received message");

        if session.is_closed() {
            return Ok(None);
        }

        let frame = InboundFrame::parse(text)?;
        if let Err(err) = session.authorize(&frame.event) {
            tracing::debug!(%connection_id, event = %frame.event, "rejected before authentication");
            return Ok(Some(err.to_frame(None)));
        }

        match ClientEvent::try_from(frame)? {
            ClientEvent::Ping(data) => {
                session.heartbeat();
                Ok(Some(OutboundFrame::new(events::PONG, data)))
            }
            ClientEvent::Auth(payload) => Ok(Some(self.handle_auth(session, payload).await)),
            ClientEvent::GetGeoms(payload) => {
                let result = self.handle_get_geoms(payload).await;
                Ok(Some(reply_or_report(session, events::GET_GEOMS, result)))
            }
            ClientEvent::GetCoordinates(payload) => {
                let result = self.handle_get_coordinates(payload).await;
                Ok(Some(reply_or_report(session, events::GET_COORDINATES, result)))
            }
            ClientEvent::Unknown(event) => {
                tracing::debug!(%connection_id, %event, "ignoring unknown event");
                Ok(None)
            }
        }
    }

    async fn handle_auth(&self, session: &mut Session, payload: AuthPayload) -> OutboundFrame {
        let connection_id = session.id();
        match self.auth.validate_credential(&payload.credential).await {
            Ok(identity) => {
                tracing::info!(%connection_id, subject = %identity.subject, "connection authorized");
                session.authenticate(identity);
                OutboundFrame::new(events::AUTHORIZED, serde_json::json!({}))
            }
            Err(err) => {
                tracing::warn!(
                    %connection_id,
                    still_authenticated = session.is_authenticated(),
                    error = %err,
                    "authorization attempt failed"
                );
                err.to_frame(Some(events::AUTH))
            }
        }
    }

    async fn handle_get_geoms(&self, payload: GetGeomsPayload) -> Result<OutboundFrame, StreamError> {
        let snapshot = self
            .geom_service
            .geoms_for_day(&payload.environment_id, payload.date)
            .await?;
        OutboundFrame::with_payload(events::GEOMS, &snapshot)
    }

    async fn handle_get_coordinates(
        &self,
        request: CoordinatesRequest,
    ) -> Result<OutboundFrame, StreamError> {
        let groups = self
            .geom_service
            .coordinates_window(request.scope, &request.device_id, request.from, request.seconds)
            .await?;
        OutboundFrame::with_payload(events::COORDINATES, &groups)
    }
}

/// Turns a handler result into the frame sent back, logging failures with
/// enough context to trace them to a connection and identity.
fn reply_or_report(
    session: &Session,
    event: &'static str,
    result: Result<OutboundFrame, StreamError>,
) -> OutboundFrame {
    match result {
        Ok(frame) => frame,
        Err(err) => {
            tracing::error!(
                connection_id = %session.id(),
                subject = session.subject().unwrap_or("-"),
                event,
                error = %err,
                "request failed"
            );
            err.to_frame(Some(event))
        }
    }
}
