//! geom-stream server entry point.
//!
//! Starts the Axum HTTP server with the health and WebSocket endpoints and
//! the liveness sweeper.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use geom_stream::api;
use geom_stream::app_state::AppState;
use geom_stream::auth::JwtValidator;
use geom_stream::config::{LogFormat, StreamConfig};
use geom_stream::domain::ConnectionRegistry;
use geom_stream::persistence::{InMemoryGateway, PostgresGateway, QueryGateway};
use geom_stream::service::GeomService;
use geom_stream::ws::dispatcher::Dispatcher;
use geom_stream::ws::sweeper::LivenessSweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (also pulls RUST_LOG from .env)
    let config = StreamConfig::from_env()?;

    // Initialize tracing
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, ws_path = %config.ws_path, "starting geom-stream");

    // Build persistence layer
    let gateway: Arc<dyn QueryGateway> = if config.persistence_enabled {
        Arc::new(PostgresGateway::connect(&config).await?)
    } else {
        tracing::warn!("persistence disabled; serving from an empty in-memory store");
        Arc::new(InMemoryGateway::new())
    };

    // Build service and protocol layers
    let geom_service = Arc::new(GeomService::new(
        gateway,
        config.coordinate_window_secs,
        config.coordinate_max_window_secs,
    ));
    let auth = Arc::new(JwtValidator::new(&config.auth));
    let dispatcher = Arc::new(Dispatcher::new(geom_service, auth));
    let registry = Arc::new(ConnectionRegistry::new());

    // Start liveness sweeper
    let sweeper =
        LivenessSweeper::new(Arc::clone(&registry), config.heartbeat_interval()).spawn();

    // Build application state and router
    let app_state = AppState {
        dispatcher,
        registry,
    };
    let app = api::build_app(app_state, &config.ws_path);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
