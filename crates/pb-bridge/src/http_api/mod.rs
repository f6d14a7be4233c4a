// ---------------------------------------------------------------------------
// HTTP API
// ---------------------------------------------------------------------------
//
// Handlers are grouped by endpoint family; this file owns the router.

mod ask;
mod auth;
mod health;
pub mod state;
#[cfg(test)]
mod tests;

pub use state::ApiState;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use pb_telemetry::tracing_setup::request_id_middleware;

use crate::auth::AuthLayer;

/// Router without API-key enforcement (development mode).
pub fn api_router(state: Arc<ApiState>) -> Router {
    api_router_with_auth(state, None)
}

/// Build the API router. With `api_key` set, every route except `/health`
/// requires the key.
pub fn api_router_with_auth(state: Arc<ApiState>, api_key: Option<String>) -> Router {
    Router::new()
        .route("/ask", post(ask::ask))
        .route("/health", get(health::health))
        .route("/auth", post(auth::login))
        .route("/auth/status", get(auth::status))
        .route("/auth/code", post(auth::submit_code))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(AuthLayer::new(api_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
