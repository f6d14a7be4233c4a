use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;
use tracing::warn;

use pb_api_types::{AskRequest, AskResponse};

use super::state::ApiState;
use crate::api_error::ApiError;

/// POST /ask -- enqueue the prompt and wait (bounded) for its answer.
pub(crate) async fn ask(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let handle = state.queue.enqueue(req.prompt)?;
    let request_id = handle.id();

    match tokio::time::timeout(state.ask_timeout, handle).await {
        Ok(Ok(answer)) => Ok(Json(AskResponse { answer })),
        Ok(Err(failure)) => Err(failure.into()),
        Err(_) => {
            warn!(%request_id, timeout = ?state.ask_timeout, "gave up waiting for answer");
            Err(ApiError::Timeout(format!(
                "no answer within {} seconds",
                state.ask_timeout.as_secs()
            )))
        }
    }
}
