use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use pb_api_types::{CurrentRequest, HealthResponse};

use super::state::ApiState;

/// GET /health -- liveness plus queue, auth and restart counters. Answers 503
/// once the queue halted.
pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let halt_reason = state.queue.halt_reason();
    let code = if halt_reason.is_some() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = HealthResponse {
        status: if halt_reason.is_some() { "halted" } else { "healthy" }.into(),
        service: state.service.clone(),
        queue_size: state.queue.size(),
        processing: state.queue.is_processing(),
        auth_state: state.orchestrator.auth_state().to_string(),
        restart_count: state.orchestrator.restart_ledger().await.restart_count,
        current_request: state.queue.current().map(|c| CurrentRequest {
            id: c.id,
            preview: c.preview,
            started_at: c.started_at.to_rfc3339(),
        }),
        halt_reason,
    };
    (code, Json(body))
}
