//! Per-connection read/write loop.
//!
//! Frames on one connection are dispatched strictly one at a time in
//! arrival order. Reads, dispatches and sends all race the connection's
//! termination signal, so a connection evicted by the sweeper stops
//! immediately, even while blocked writing to a client that stopped
//! reading, and any pending response is discarded.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::messages::OutboundFrame;
use crate::app_state::AppState;
use crate::domain::{ConnectionId, Session};
use crate::error::StreamError;

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// Client sent a close frame or the stream ended.
    ClientClosed,
    /// Liveness sweep terminated the connection.
    Evicted,
    /// Reading or writing the socket failed.
    TransportError,
}

/// Per-connection frame counters, logged when the connection ends.
#[derive(Debug, Default)]
struct FrameStats {
    received: u64,
    sent: u64,
    malformed: u64,
}

/// Runs the read/write loop for a single WebSocket connection.
///
/// Registers the connection, drives its [`Session`] through the shared
/// dispatcher, and deregisters it on exit.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let handle = state.registry.register().await;
    let mut session = Session::new(Arc::clone(&handle));
    let connection_id = session.id();
    tracing::info!(%connection_id, "ws connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut stats = FrameStats::default();

    let reason = loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = handle.terminated() => break CloseReason::Evicted,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                stats.received = stats.received.saturating_add(1);
                let outcome = tokio::select! {
                    outcome = state.dispatcher.dispatch(&mut session, &text) => outcome,
                    () = handle.terminated() => break CloseReason::Evicted,
                };

                match outcome {
                    Ok(Some(frame)) => {
                        let sent = tokio::select! {
                            sent = send_frame(&mut ws_tx, connection_id, &frame) => sent,
                            () = handle.terminated() => break CloseReason::Evicted,
                        };
                        if sent.is_err() {
                            break CloseReason::TransportError;
                        }
                        stats.sent = stats.sent.saturating_add(1);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        stats.malformed = stats.malformed.saturating_add(1);
                        tracing::warn!(
                            %connection_id,
                            code = err.error_code(),
                            error = %err,
                            "dropping malformed frame"
                        );
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::debug!(%connection_id, error = %err, "ws read failed");
                break CloseReason::TransportError;
            }
        }
    };

    let final_state = session.state();
    session.close();
    state.registry.remove(connection_id).await;

    match reason {
        CloseReason::Evicted => {
            tracing::info!(%connection_id, "connection evicted after missed heartbeat");
        }
        CloseReason::ClientClosed | CloseReason::TransportError => {
            tracing::info!(%connection_id, ?reason, state = ?final_state, "ws connection closed");
        }
    }
    tracing::debug!(
        %connection_id,
        received = stats.received,
        sent = stats.sent,
        malformed = stats.malformed,
        "ws connection stats"
    );
    // Dropping both halves here aborts the transport without a close
    // handshake when the connection was evicted.
}

/// Serializes one frame, logs the outbound payload and sends it.
async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    connection_id: ConnectionId,
    frame: &OutboundFrame,
) -> Result<(), StreamError> {
    let text = frame.to_text()?;
    tracing::info!(%connection_id, payload = %text, "sending message");
    ws_tx
        .send(Message::text(text))
        .await
        .map_err(|e| StreamError::Internal(e.to_string()))
}
