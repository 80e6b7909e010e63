//! WebSocket front end for the Wayfarer hub.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

pub mod handlers;
pub mod infra;
pub mod worker;

use infra::app_state::AppState;

/// HTTP routes: the `/ws` session endpoint and `/health`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
