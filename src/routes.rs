use axum::{routing::get, Router};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

async fn healthz() -> &'static str {
    "ok"
}

/// Build the axum Router for the gateway.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{token}", get(ws_handler::ws_upgrade))
        .route("/healthz", get(healthz))
        .with_state(state)
}
