use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use super::app_state::AppState;
use super::ws;

/// Build the axum router with the WebSocket and health routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", axum::routing::get(ws::ws_upgrade))
        .route("/healthz", axum::routing::get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
