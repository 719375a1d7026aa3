//! Shared helpers: an in-process server over an in-memory store and a
//! WebSocket client speaking the `{event, data}` protocol.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use geom_stream::api::build_app;
use geom_stream::app_state::AppState;
use geom_stream::auth::JwtValidator;
use geom_stream::config::AuthConfig;
use geom_stream::domain::ConnectionRegistry;
use geom_stream::persistence::InMemoryGateway;
use geom_stream::persistence::models::{Coordinate, Geometry, STATUS_SUCCESS, Sample};
use geom_stream::service::GeomService;
use geom_stream::ws::dispatcher::Dispatcher;
use geom_stream::ws::sweeper::LivenessSweeper;

/// Secret shared by the server and [`token`].
pub const SECRET: &str = "integration-secret";

/// Client side of one WebSocket connection.
pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running server and handles to its internals.
#[derive(Debug)]
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// Open connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Backing store.
    pub store: Arc<InMemoryGateway>,
    /// Sweeper over `registry`, driven manually by tests.
    pub sweeper: LivenessSweeper,
}

/// 2024-01-01T10:00:00Z.
pub fn t0() -> DateTime<Utc> {
    let Some(t) = DateTime::from_timestamp(1_704_103_200, 0) else {
        panic!("valid timestamp");
    };
    t
}

fn sample(id: i32, status: &str) -> Sample {
    Sample {
        id,
        start_time: t0(),
        end_time: Some(t0() + TimeDelta::hours(8)),
        frames_per_second: Some(10),
        num_frames: Some(288_000),
        frame_width: Some(1296),
        frame_height: Some(972),
        environment_id: "E1".to_string(),
        source_id: Some("src-1".to_string()),
        source_type: Some("cuwb".to_string()),
        source_name: Some("classroom".to_string()),
        status: status.to_string(),
        inference_id: None,
        inference_name: None,
        inference_model: None,
        inference_version: None,
    }
}

/// Seeds environment `E1` on 2024-01-01 with a failed sample 5 and a
/// successful sample 7 owning geometry 1 (`G1`), plus three coordinates
/// from device `D1` at t0, t0+1s, t0+2s.
pub async fn seed(store: &InMemoryGateway) {
    let geom = Geometry {
        id: 1,
        sample_id: 7,
        uuid: Some("G1".to_string()),
        attributes: Some(serde_json::json!({ "color": "#ff0000" })),
        geom_type: Some("circle".to_string()),
        object_id: Some("tray-1".to_string()),
        object_type: Some("tray".to_string()),
        object_name: Some("Tray 1".to_string()),
    };
    let mut ok = store.insert_sample(sample(5, "failed")).await.is_ok()
        && store.insert_sample(sample(7, STATUS_SUCCESS)).await.is_ok()
        && store.insert_geom(geom).await.is_ok();
    for offset in 0..3 {
        ok &= store
            .insert_coordinate(Coordinate {
                time: t0() + TimeDelta::seconds(offset),
                device_id: "D1".to_string(),
                assignment_id: Some("A1".to_string()),
                geom_id: 1,
                coordinates: vec![Some(1.0), Some(2.0), None],
            })
            .await
            .is_ok();
    }
    if !ok {
        panic!("seeding failed");
    }
}

/// Starts a server on an ephemeral port over a seeded in-memory store.
pub async fn spawn_server() -> TestServer {
    let store = Arc::new(InMemoryGateway::new());
    seed(&store).await;

    let auth = JwtValidator::new(&AuthConfig {
        jwt_secret: SECRET.to_string(),
        jwt_audience: None,
        jwt_issuer: None,
        jwt_leeway_secs: 0,
    });
    let service = GeomService::new(Arc::clone(&store) as _, 25, 300);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(service), Arc::new(auth)));
    let registry = Arc::new(ConnectionRegistry::new());
    let sweeper = LivenessSweeper::new(Arc::clone(&registry), Duration::from_secs(60));

    let app = build_app(
        AppState {
            dispatcher,
            registry: Arc::clone(&registry),
        },
        "/ws",
    );

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestServer {
        addr,
        registry,
        store,
        sweeper,
    }
}

/// Mints an HS256 token expiring `exp_offset_secs` from now.
pub fn token(exp_offset_secs: i64) -> String {
    let claims = serde_json::json!({
        "sub": "integration-user",
        "exp": Utc::now().timestamp() + exp_offset_secs,
    });
    let Ok(t) = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    ) else {
        panic!("encoding failed");
    };
    t
}

/// Opens a WebSocket connection and waits until the server registered it.
pub async fn connect(server: &TestServer) -> WsClient {
    let before = server.registry.len().await;
    let Ok((ws, _)) = connect_async(format!("ws://{}/ws", server.addr)).await else {
        panic!("ws connect failed");
    };
    for _ in 0..100 {
        if server.registry.len().await > before {
            return ws;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection was never registered");
}

/// Sends a raw text frame.
pub async fn send_text(ws: &mut WsClient, text: &str) {
    if ws.send(Message::text(text.to_string())).await.is_err() {
        panic!("ws send failed");
    }
}

/// Sends `{event, data}`.
pub async fn send_event(ws: &mut WsClient, event: &str, data: serde_json::Value) {
    let frame = serde_json::json!({ "event": event, "data": data });
    send_text(ws, &frame.to_string()).await;
}

/// Receives the next text frame as JSON, failing after two seconds.
pub async fn recv(ws: &mut WsClient) -> serde_json::Value {
    let Some(value) = try_recv(ws, Duration::from_secs(2)).await else {
        panic!("no frame received");
    };
    value
}

/// Receives the next text frame within `wait`, if any.
pub async fn try_recv(ws: &mut WsClient, wait: Duration) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let next = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match next {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Authenticates with a fresh token and asserts `authorized`.
pub async fn authenticate(ws: &mut WsClient) {
    send_event(ws, "auth", serde_json::json!({ "Authorization": token(3600) })).await;
    let reply = recv(ws).await;
    assert_eq!(reply["event"], "authorized");
}
