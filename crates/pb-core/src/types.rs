use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::BridgeError;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A single prompt admitted to the queue.
///
/// Created on enqueue and never mutated afterwards. The completion handle
/// travels separately (see `pb_agents::queue`) so that this type stays plain
/// data that can be cloned into logs and status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// Build a request, rejecting empty or whitespace-only prompts.
    pub fn new(prompt: impl Into<String>) -> Result<Self, BridgeError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("prompt is required".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            prompt,
            created_at: Utc::now(),
        })
    }

    /// First `max_chars` characters of the prompt, for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.prompt, max_chars)
    }
}

/// Truncate `text` to at most `max_chars` characters, appending an ellipsis
/// when something was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotAuthenticated,
    AwaitingCredentials,
    AwaitingCode,
    Completed,
    Failed,
}

impl AuthState {
    /// `Completed` and `Failed` accept no further credential input.
    pub fn is_terminal(self) -> bool {
        matches!(self, AuthState::Completed | AuthState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthState::NotAuthenticated => "not_authenticated",
            AuthState::AwaitingCredentials => "awaiting_credentials",
            AuthState::AwaitingCode => "awaiting_code",
            AuthState::Completed => "completed",
            AuthState::Failed => "failed",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of authentication progress, safe to hand to any reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub state: AuthState,
    pub email_provided: bool,
    pub password_provided: bool,
    pub code_provided: bool,
    pub agent_initialized: bool,
}

impl Default for AuthStatus {
    fn default() -> Self {
        Self {
            state: AuthState::NotAuthenticated,
            email_provided: false,
            password_provided: false,
            code_provided: false,
            agent_initialized: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A credential value that is wiped from memory on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Login credentials for the agent's account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Secret,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestFailure
// ---------------------------------------------------------------------------

/// Why a request resolved without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidArgument,
    NotAuthenticated,
    InvalidState,
    Unsupported,
    Transient,
    Critical,
    Fatal,
    Closed,
    Internal,
}

/// The failure value a completion handle resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RequestFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RequestFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<BridgeError> for RequestFailure {
    fn from(err: BridgeError) -> Self {
        let kind = match &err {
            BridgeError::InvalidArgument(_) => FailureKind::InvalidArgument,
            BridgeError::NotAuthenticated(_) => FailureKind::NotAuthenticated,
            BridgeError::InvalidState { .. } => FailureKind::InvalidState,
            BridgeError::Unsupported(_) => FailureKind::Unsupported,
            BridgeError::TransientAgentFailure(_) => FailureKind::Transient,
            BridgeError::CriticalAgentFailure { .. } => FailureKind::Critical,
            BridgeError::RestartLimitExceeded { .. } => FailureKind::Fatal,
            BridgeError::QueueClosed(_) => FailureKind::Closed,
            BridgeError::Internal(_) => FailureKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}
