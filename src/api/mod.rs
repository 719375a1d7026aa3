//! HTTP surface: health endpoint, OpenAPI document, and router composition.
//!
//! The WebSocket endpoint is mounted alongside the REST routes in
//! [`build_app`].

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI document for the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "geom-stream", description = "Geometry and coordinate streaming gateway"),
    paths(handlers::system::health_handler),
    tags((name = "System", description = "Service status"))
)]
pub struct ApiDoc;

/// Builds the router with all HTTP endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new().merge(handlers::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route("/api-docs/openapi.json", get(openapi_handler));

    router
}

/// Builds the complete application: HTTP routes, the WebSocket endpoint at
/// `ws_path`, request tracing and CORS.
pub fn build_app(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .merge(build_router())
        .route(ws_path, get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(not(feature = "swagger-ui"))]
async fn openapi_handler() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDoc::openapi())
}
