//! Wire types of the prompt-bridge HTTP API.
//!
//! Shared by the daemon (which serializes them) and the CLI (which parses
//! them). Response fields default on deserialize so that older clients keep
//! working against newer servers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── /ask ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub answer: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

// ── /health ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentRequest {
    pub id: Uuid,
    #[serde(default)]
    pub preview: String,
    /// RFC 3339.
    #[serde(default)]
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HealthResponse {
    /// `"healthy"`, or `"halted"` after the restart limit was exceeded.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub queue_size: usize,
    #[serde(default)]
    pub processing: bool,
    #[serde(default)]
    pub auth_state: String,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub current_request: Option<CurrentRequest>,
    /// Why the bridge halted, when it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
}

// ── /auth ──

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuthStatusResponse {
    /// One of `not_authenticated`, `awaiting_credentials`, `awaiting_code`,
    /// `completed`, `failed`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub email_provided: bool,
    #[serde(default)]
    pub password_provided: bool,
    #[serde(default)]
    pub code_provided: bool,
    #[serde(default)]
    pub agent_initialized: bool,
}

/// Reply to the auth mutations.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuthStepResponse {
    /// Always `"success"`; failures use [`ErrorBody`].
    #[serde(default)]
    pub status: String,
    /// Auth state after the step.
    #[serde(default)]
    pub auth_state: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_tolerates_missing_fields() {
        let health: HealthResponse = serde_json::from_str(r#"{"status":"healthy"}"#).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.queue_size, 0);
        assert!(health.current_request.is_none());
    }

    #[test]
    fn halt_reason_is_omitted_while_healthy() {
        let json = serde_json::to_value(HealthResponse {
            status: "healthy".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(json.get("halt_reason").is_none());
        assert!(json.get("current_request").unwrap().is_null());
    }

    #[test]
    fn ask_request_without_prompt_parses_as_empty() {
        let req: AskRequest = serde_json::from_str("{}").unwrap();
        assert!(req.prompt.is_empty());
    }
}
