//! HTTP API error types.
//!
//! Every failure leaves the API as `{"error": "<message>"}` with a status code
//! chosen from the error's kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use pb_api_types::ErrorBody;
use pb_core::error::BridgeError;
use pb_core::types::{FailureKind, RequestFailure};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The call conflicts with the current authentication state.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The bridge stopped taking work.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_message(self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Conflict(msg)
            | ApiError::NotImplemented(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Timeout(msg)
            | ApiError::InternalError(msg) => msg,
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let msg = err.to_string();
        match err {
            BridgeError::InvalidArgument(_) => ApiError::BadRequest(msg),
            BridgeError::InvalidState { .. } => ApiError::Conflict(msg),
            BridgeError::Unsupported(_) => ApiError::NotImplemented(msg),
            BridgeError::QueueClosed(_) | BridgeError::RestartLimitExceeded { .. } => {
                ApiError::Unavailable(msg)
            }
            BridgeError::NotAuthenticated(_)
            | BridgeError::TransientAgentFailure(_)
            | BridgeError::CriticalAgentFailure { .. }
            | BridgeError::Internal(_) => ApiError::InternalError(msg),
        }
    }
}

/// Failed prompts: the caller always gets the queue's short message back.
impl From<RequestFailure> for ApiError {
    fn from(failure: RequestFailure) -> Self {
        match failure.kind {
            FailureKind::InvalidArgument => ApiError::BadRequest(failure.message),
            FailureKind::Closed | FailureKind::Fatal => ApiError::Unavailable(failure.message),
            _ => ApiError::InternalError(failure.message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.into_message(),
        });
        (status, body).into_response()
    }
}
