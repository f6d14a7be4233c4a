use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Secret;

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// The ways an agent session can become unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalKind {
    /// The session was never started or has been torn down.
    SessionUninitialized,
    /// A call exceeded the hard per-call deadline.
    HardTimeout,
    /// The agent gave up after its own internal retries.
    RetriesExhausted,
    /// The connection to the agent broke (process exited, pipe closed).
    SessionLost,
}

impl CriticalKind {
    /// Best-effort classification of free-text failure messages.
    ///
    /// Only for adapters whose agent reports errors as prose; agents that can
    /// return a structured [`AgentFailure`] should do so instead.
    pub fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if lower.contains("not initialized") || lower.contains("не инициализирован") {
            Some(CriticalKind::SessionUninitialized)
        } else if lower.contains("exhausted") || lower.contains("too many retries") {
            Some(CriticalKind::RetriesExhausted)
        } else if lower.contains("timeout") || lower.contains("timed out") || lower.contains("таймаут") {
            Some(CriticalKind::HardTimeout)
        } else if lower.contains("target closed") || lower.contains("session closed") {
            Some(CriticalKind::SessionLost)
        } else {
            None
        }
    }
}

impl fmt::Display for CriticalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CriticalKind::SessionUninitialized => "session uninitialized",
            CriticalKind::HardTimeout => "hard timeout",
            CriticalKind::RetriesExhausted => "retries exhausted",
            CriticalKind::SessionLost => "session lost",
        };
        f.write_str(label)
    }
}

/// A failure reported by an [`AgentPort`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentFailure {
    /// Scoped to the one call (stale element, slow page). No restart.
    #[error("{message}")]
    Transient { message: String },

    /// The session cannot serve further calls until it is rebuilt.
    #[error("{kind}: {message}")]
    Critical { kind: CriticalKind, message: String },
}

impl AgentFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        AgentFailure::Transient {
            message: message.into(),
        }
    }

    pub fn critical(kind: CriticalKind, message: impl Into<String>) -> Self {
        AgentFailure::Critical {
            kind,
            message: message.into(),
        }
    }

    /// Classify a prose message: critical if it matches a known signature,
    /// transient otherwise.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match CriticalKind::from_message(&message) {
            Some(kind) => AgentFailure::Critical { kind, message },
            None => AgentFailure::Transient { message },
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, AgentFailure::Critical { .. })
    }
}

// ---------------------------------------------------------------------------
// Authentication vocabulary
// ---------------------------------------------------------------------------

/// One piece of login input handed to the agent.
#[derive(Debug, Clone)]
pub enum AuthStep {
    Email(String),
    Password(Secret),
    /// Out-of-band verification code (e.g. from an email).
    Code(String),
}

impl AuthStep {
    pub fn label(&self) -> &'static str {
        match self {
            AuthStep::Email(_) => "email",
            AuthStep::Password(_) => "password",
            AuthStep::Code(_) => "code",
        }
    }
}

/// What the agent's login flow did with a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Input taken, the flow moved on.
    Accepted,
    /// The flow now shows a verification-code prompt.
    CodeRequired,
    /// The flow finished and the session is logged in.
    Authenticated,
    /// The input was refused (wrong password, wrong code).
    Rejected(String),
    /// This agent has no such step.
    Unsupported,
}

/// What the agent's session currently looks like from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAuthProbe {
    LoggedOut,
    CodeRequired,
    LoggedIn,
}

// ---------------------------------------------------------------------------
// AgentPort
// ---------------------------------------------------------------------------

/// The single-session automation agent.
///
/// Implementations are not required to be safe for overlapping calls; the
/// orchestrator that owns the instance serializes every operation.
#[async_trait]
pub trait AgentPort: Send {
    async fn initialize(&mut self) -> Result<(), AgentFailure>;

    async fn authenticate_step(&mut self, step: AuthStep) -> Result<StepOutcome, AgentFailure>;

    async fn auth_probe(&mut self) -> Result<AgentAuthProbe, AgentFailure>;

    async fn submit(&mut self, prompt: &str) -> Result<String, AgentFailure>;

    async fn shutdown(&mut self) -> Result<(), AgentFailure>;
}

/// Builds fresh agent instances; a restart discards the old one entirely.
pub trait AgentFactory: Send + Sync {
    fn create(&self) -> Box<dyn AgentPort>;
}

impl<F> AgentFactory for F
where
    F: Fn() -> Box<dyn AgentPort> + Send + Sync,
{
    fn create(&self) -> Box<dyn AgentPort> {
        self()
    }
}
