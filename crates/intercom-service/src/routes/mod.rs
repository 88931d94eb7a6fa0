//! HTTP routes for the intercom service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers::{self, productions, sessions, whip};
use crate::observability::http_metrics::http_metrics_middleware;
use crate::services::Orchestrator;
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session orchestration over the bridge and the directory.
    pub orchestrator: Arc<Orchestrator>,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/v1/productions/...` - Production, line and participant management
/// - `/api/v1/sessions/...`, `/api/v1/heartbeat/{id}` - Broker-offered sessions
/// - `/whip/...`, `/whep/...` - WHIP ingest and WHEP egress resources
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/v1/productions",
            post(productions::create_production).get(productions::list_productions),
        )
        .route(
            "/api/v1/productions/:id",
            get(productions::get_production).delete(productions::delete_production),
        )
        .route("/api/v1/productions/:id/lines", post(productions::add_line))
        .route(
            "/api/v1/productions/:id/lines/:line_id",
            patch(productions::rename_line).delete(productions::delete_line),
        )
        .route(
            "/api/v1/productions/:id/lines/:line_id/conference",
            post(productions::ensure_conference),
        )
        .route(
            "/api/v1/productions/:id/lines/:line_id/participants",
            get(productions::list_participants),
        )
        .route("/api/v1/sessions", post(sessions::create_session))
        .route(
            "/api/v1/sessions/:id",
            patch(sessions::submit_answer).delete(sessions::delete_session),
        )
        .route("/api/v1/heartbeat/:id", get(sessions::heartbeat))
        .route(
            "/whip/productions/:id/lines/:line_id",
            post(whip::create_whip),
        )
        .route(
            "/whep/productions/:id/lines/:line_id",
            post(whip::create_whep),
        )
        .route("/whip/sessions/:id", delete(whip::delete_whip))
        .route("/whep/sessions/:id", delete(whip::delete_whep))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
