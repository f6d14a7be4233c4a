use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;

use pb_api_types::{AuthStatusResponse, AuthStepResponse, CodeRequest, LoginRequest};
use pb_core::error::BridgeError;
use pb_core::types::{AuthState, Credentials};

use super::state::ApiState;
use crate::api_error::ApiError;

fn step_response(state: AuthState, message: &str) -> Json<AuthStepResponse> {
    Json(AuthStepResponse {
        status: "success".into(),
        auth_state: state.to_string(),
        message: message.into(),
    })
}

/// GET /auth/status
pub(crate) async fn status(State(state): State<Arc<ApiState>>) -> Json<AuthStatusResponse> {
    let s = state.orchestrator.auth_status();
    Json(AuthStatusResponse {
        status: s.state.to_string(),
        email_provided: s.email_provided,
        password_provided: s.password_provided,
        code_provided: s.code_provided,
        agent_initialized: s.agent_initialized,
    })
}

/// POST /auth -- log in with caller-supplied credentials.
pub(crate) async fn login(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthStepResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("email and password are required".into()));
    }

    let credentials = Credentials::new(req.email, req.password);
    match state.orchestrator.begin_authentication(credentials).await? {
        AuthState::Failed => Err(ApiError::Unauthorized("authentication failed".into())),
        AuthState::AwaitingCode => Ok(step_response(
            AuthState::AwaitingCode,
            "verification code required, submit it to /auth/code",
        )),
        other => Ok(step_response(other, "authenticated")),
    }
}

/// POST /auth/code -- forward the emailed verification code.
pub(crate) async fn submit_code(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<CodeRequest>, JsonRejection>,
) -> Result<Json<AuthStepResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code is required".into()));
    }

    match state.orchestrator.provide_code(&req.code).await {
        Ok(AuthState::Completed) => Ok(step_response(AuthState::Completed, "authenticated")),
        Ok(other) => Err(ApiError::BadRequest(format!(
            "code not accepted, authentication is {other}"
        ))),
        Err(err @ BridgeError::InvalidState { .. }) => Err(ApiError::BadRequest(err.to_string())),
        Err(err) => Err(err.into()),
    }
}
