//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/paths", post(http::http_create_path).get(http::http_list_paths))
        .route("/api/v1/paths/:path_id", get(http::http_get_path).delete(http::http_delete_path))
        .route("/api/v1/paths/:path_id/steps/:step_id/complete", post(http::http_complete_step))
        .route("/api/v1/paths/:path_id/checkpoints/:checkpoint_id/attempts", post(http::http_take_checkpoint))
        .route("/api/v1/paths/:path_id/branches", post(http::http_create_branch))
        .route("/api/v1/paths/:path_id/active-branch", put(http::http_switch_branch))
        .route("/api/v1/paths/:path_id/adapt", post(http::http_adapt_path))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
