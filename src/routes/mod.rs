//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two transports reach the same synchronization core: `/api/sync` carries
//! classic request/response cycles (with the callback interval driving
//! client polling), `/api/ws` upgrades to the persistent socket transport.

pub mod sync;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sync", post(sync::handle_sync))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
