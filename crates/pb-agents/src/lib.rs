//! Request queue, auth state machine and agent orchestration.
//!
//! [`queue::RequestQueue`] turns many concurrent callers into a strictly
//! serialized stream of prompts. [`orchestrator::BridgeOrchestrator`] owns the
//! one agent session, gates it on [`state_machine::AuthStateMachine`] and
//! recovers it through a bounded restart breaker.

mod deadline;
pub mod orchestrator;
pub mod queue;
pub mod state_machine;

pub use orchestrator::{BridgeOrchestrator, OrchestratorConfig};
pub use queue::{InFlight, PromptExecutor, QueueOptions, RequestHandle, RequestQueue};
pub use state_machine::{AuthEvent, AuthStateMachine, StateMachineError};
