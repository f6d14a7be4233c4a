use crate::agent::{AgentFailure, CriticalKind};
use crate::types::AuthState;

/// Error taxonomy shared by the queue, the orchestrator and the front ends.
///
/// Only [`BridgeError::RestartLimitExceeded`] is fatal: it means the agent
/// could not be recovered automatically and the owner of the orchestrator
/// must stop accepting work. Everything else is scoped to a single call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Rejected at the boundary (empty prompt, missing field); never enqueued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Prompts cannot be submitted until authentication has completed.
    #[error("not authenticated (state: {0})")]
    NotAuthenticated(AuthState),

    /// An authentication step was attempted from the wrong state.
    #[error("cannot {operation} while authentication is {state}")]
    InvalidState {
        state: AuthState,
        operation: &'static str,
    },

    /// The agent does not implement the requested step.
    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("agent error: {0}")]
    TransientAgentFailure(String),

    #[error("agent unusable ({kind}): {message}")]
    CriticalAgentFailure { kind: CriticalKind, message: String },

    #[error("restart limit exceeded: {restarts} of {max} automatic restarts used, operator intervention required")]
    RestartLimitExceeded { restarts: u32, max: u32 },

    #[error("queue closed: {0}")]
    QueueClosed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::RestartLimitExceeded { .. })
    }
}

impl From<AgentFailure> for BridgeError {
    fn from(failure: AgentFailure) -> Self {
        match failure {
            AgentFailure::Transient { message } => BridgeError::TransientAgentFailure(message),
            AgentFailure::Critical { kind, message } => {
                BridgeError::CriticalAgentFailure { kind, message }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
