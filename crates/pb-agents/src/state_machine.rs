use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use pb_core::agent::{AgentAuthProbe, AgentFailure, AgentPort, AuthStep, StepOutcome};
use pb_core::error::BridgeError;
use pb_core::types::{AuthState, AuthStatus, Credentials};

use crate::deadline::bounded;

// ---------------------------------------------------------------------------
// AuthEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    /// Credentials are about to be typed into the login form.
    Begin,
    /// The agent is showing a verification-code prompt.
    CodeRequested,
    /// The agent confirmed a logged-in session.
    Confirmed,
    /// A recoverable hiccup during login; the attempt can be repeated.
    Abort,
    /// The agent hit an unrecoverable error or refused the credentials.
    Fail,
    /// A fresh agent session replaced the old one.
    Reset,
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthEvent::Begin => "Begin",
            AuthEvent::CodeRequested => "CodeRequested",
            AuthEvent::Confirmed => "Confirmed",
            AuthEvent::Abort => "Abort",
            AuthEvent::Fail => "Fail",
            AuthEvent::Reset => "Reset",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    #[error("invalid transition: cannot apply {event} in state {state}")]
    InvalidTransition { state: AuthState, event: AuthEvent },
}

/// Valid transitions:
/// - NotAuthenticated    + Begin         -> AwaitingCredentials
/// - AwaitingCredentials + CodeRequested -> AwaitingCode
/// - AwaitingCredentials + Confirmed     -> Completed
/// - AwaitingCode        + Confirmed     -> Completed
/// - AwaitingCredentials + Abort         -> NotAuthenticated
/// - any non-terminal    + Fail          -> Failed
/// - any                 + Reset         -> NotAuthenticated
fn next_state(state: AuthState, event: AuthEvent) -> Option<AuthState> {
    use AuthEvent as E;
    use AuthState as S;
    match (state, event) {
        (S::NotAuthenticated, E::Begin) => Some(S::AwaitingCredentials),
        (S::AwaitingCredentials, E::CodeRequested) => Some(S::AwaitingCode),
        (S::AwaitingCredentials, E::Confirmed) => Some(S::Completed),
        (S::AwaitingCode, E::Confirmed) => Some(S::Completed),
        (S::AwaitingCredentials, E::Abort) => Some(S::NotAuthenticated),
        (s, E::Fail) if !s.is_terminal() => Some(S::Failed),
        (_, E::Reset) => Some(S::NotAuthenticated),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// AuthStateMachine
// ---------------------------------------------------------------------------

/// Login progress of the agent session.
///
/// The status lives in a watch channel so that any front end can read it at
/// any time without waiting on an agent call. `begin` and `provide_code`
/// drive the agent; they take the agent by `&mut`, which the orchestrator
/// only hands out while it holds its execution slot. Neither waits for the
/// out-of-band code: `begin` returns as soon as the agent asks for one.
#[derive(Debug)]
pub struct AuthStateMachine {
    tx: watch::Sender<AuthStatus>,
    step_timeout: Duration,
}

impl AuthStateMachine {
    pub fn new(step_timeout: Duration) -> Self {
        let (tx, _rx) = watch::channel(AuthStatus::default());
        Self { tx, step_timeout }
    }

    pub fn state(&self) -> AuthState {
        self.tx.borrow().state
    }

    pub fn status(&self) -> AuthStatus {
        *self.tx.borrow()
    }

    /// Receive every status change, e.g. to await `Completed`.
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.tx.subscribe()
    }

    /// Returns `true` if `event` is valid in the current state.
    pub fn can_transition(&self, event: AuthEvent) -> bool {
        next_state(self.state(), event).is_some()
    }

    /// Apply `event` atomically against the current state.
    pub fn transition(&self, event: AuthEvent) -> Result<AuthState, StateMachineError> {
        let mut outcome = None;
        self.tx.send_if_modified(|status| {
            let from = status.state;
            let next = next_state(from, event);
            outcome = Some((from, next));
            match next {
                Some(to) => {
                    status.state = to;
                    if event == AuthEvent::Reset {
                        *status = AuthStatus {
                            state: to,
                            ..AuthStatus::default()
                        };
                    }
                    true
                }
                None => false,
            }
        });

        match outcome {
            Some((from, Some(to))) => {
                debug!(from = %from, event = %event, to = %to, "auth state transition");
                Ok(to)
            }
            Some((from, None)) => Err(StateMachineError::InvalidTransition { state: from, event }),
            None => Err(StateMachineError::InvalidTransition {
                state: self.state(),
                event,
            }),
        }
    }

    /// Forget everything about the previous agent session.
    pub fn reset(&self) {
        // Reset is valid from every state.
        let _ = self.transition(AuthEvent::Reset);
    }

    pub(crate) fn set_agent_initialized(&self, initialized: bool) {
        self.tx.send_if_modified(|status| {
            let changed = status.agent_initialized != initialized;
            status.agent_initialized = initialized;
            changed
        });
    }

    fn mark_provided(&self, step: &AuthStep) {
        self.tx.send_modify(|status| match step {
            AuthStep::Email(_) => status.email_provided = true,
            AuthStep::Password(_) => status.password_provided = true,
            AuthStep::Code(_) => status.code_provided = true,
        });
    }

    // ------------------------------------------------------------------
    // Driving the agent
    // ------------------------------------------------------------------

    /// Log in with `credentials`. Valid only from `NotAuthenticated`.
    ///
    /// Returns the resulting state: `Completed`, `AwaitingCode` (the caller
    /// must later supply the code through [`provide_code`](Self::provide_code))
    /// or `Failed` when the agent refused the credentials. Agent failures are
    /// returned as errors; a transient one puts the machine back to
    /// `NotAuthenticated` so the login can be retried, a critical one fails it.
    pub async fn begin(
        &self,
        agent: &mut dyn AgentPort,
        credentials: &Credentials,
    ) -> Result<AuthState, BridgeError> {
        self.transition(AuthEvent::Begin)
            .map_err(|e| invalid_state(e, "begin authentication"))?;
        info!(email = %credentials.email, "authentication started");

        match self.drive_login(agent, credentials).await {
            Ok(state) => {
                info!(state = %state, "authentication step finished");
                Ok(state)
            }
            Err(failure) => {
                let event = if failure.is_critical() {
                    AuthEvent::Fail
                } else {
                    AuthEvent::Abort
                };
                warn!(error = %failure, event = %event, "authentication interrupted by agent failure");
                let _ = self.transition(event);
                Err(failure.into())
            }
        }
    }

    async fn drive_login(
        &self,
        agent: &mut dyn AgentPort,
        credentials: &Credentials,
    ) -> Result<AuthState, AgentFailure> {
        // A persistent agent profile may already be logged in.
        if bounded(self.step_timeout, "auth probe", agent.auth_probe()).await?
            == AgentAuthProbe::LoggedIn
        {
            return Ok(self.apply(AuthEvent::Confirmed));
        }

        let email = AuthStep::Email(credentials.email.clone());
        if let Some(state) = self.send_credential(agent, email).await? {
            return Ok(state);
        }

        let password = AuthStep::Password(credentials.password.clone());
        if let Some(state) = self.send_credential(agent, password).await? {
            return Ok(state);
        }

        // The form took both fields without saying where it went next.
        let probe = bounded(self.step_timeout, "auth probe", agent.auth_probe()).await?;
        Ok(match probe {
            AgentAuthProbe::LoggedIn => self.apply(AuthEvent::Confirmed),
            AgentAuthProbe::CodeRequired => self.apply(AuthEvent::CodeRequested),
            AgentAuthProbe::LoggedOut => {
                warn!("agent accepted credentials but is still logged out");
                self.apply(AuthEvent::Fail)
            }
        })
    }

    /// Send one credential. `Some(state)` ends the login flow early.
    async fn send_credential(
        &self,
        agent: &mut dyn AgentPort,
        step: AuthStep,
    ) -> Result<Option<AuthState>, AgentFailure> {
        let label = step.label();
        self.mark_provided(&step);
        let outcome = bounded(self.step_timeout, label, agent.authenticate_step(step)).await?;
        debug!(step = label, ?outcome, "credential step answered");

        Ok(match outcome {
            StepOutcome::Accepted | StepOutcome::Unsupported => None,
            StepOutcome::Authenticated => Some(self.apply(AuthEvent::Confirmed)),
            StepOutcome::CodeRequired => {
                info!("agent requires a verification code");
                Some(self.apply(AuthEvent::CodeRequested))
            }
            StepOutcome::Rejected(reason) => {
                warn!(step = label, %reason, "credentials rejected");
                Some(self.apply(AuthEvent::Fail))
            }
        })
    }

    /// Hand the out-of-band code to the agent. Valid only from `AwaitingCode`.
    ///
    /// On acceptance the agent is probed; the machine moves to `Completed` only
    /// when the probe confirms a logged-in session and otherwise stays in
    /// `AwaitingCode` so the caller can retry with a corrected code.
    pub async fn provide_code(
        &self,
        agent: &mut dyn AgentPort,
        code: &str,
    ) -> Result<AuthState, BridgeError> {
        let state = self.state();
        if state != AuthState::AwaitingCode {
            return Err(BridgeError::InvalidState {
                state,
                operation: "provide a verification code",
            });
        }

        match self.drive_code(agent, code).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(BridgeError::Unsupported(
                "this agent does not accept verification codes".into(),
            )),
            Err(failure) => {
                if failure.is_critical() {
                    let _ = self.transition(AuthEvent::Fail);
                }
                warn!(error = %failure, "verification code step failed");
                Err(failure.into())
            }
        }
    }

    /// `None` when the agent has no code step at all.
    async fn drive_code(
        &self,
        agent: &mut dyn AgentPort,
        code: &str,
    ) -> Result<Option<AuthState>, AgentFailure> {
        let step = AuthStep::Code(code.trim().to_string());
        self.mark_provided(&step);
        let outcome = bounded(self.step_timeout, "code", agent.authenticate_step(step)).await?;

        match outcome {
            StepOutcome::Authenticated => return Ok(Some(self.apply(AuthEvent::Confirmed))),
            StepOutcome::Rejected(reason) => {
                warn!(%reason, "verification code rejected");
                return Ok(Some(self.state()));
            }
            StepOutcome::Unsupported => return Ok(None),
            StepOutcome::Accepted | StepOutcome::CodeRequired => {}
        }

        let probe = bounded(self.step_timeout, "auth probe", agent.auth_probe()).await?;
        if probe == AgentAuthProbe::LoggedIn {
            Ok(Some(self.apply(AuthEvent::Confirmed)))
        } else {
            info!(?probe, "code accepted but login not confirmed yet");
            Ok(Some(self.state()))
        }
    }

    /// Apply a transition the login flow knows to be valid, returning the
    /// state afterwards either way.
    fn apply(&self, event: AuthEvent) -> AuthState {
        match self.transition(event) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "ignoring out-of-order auth event");
                self.state()
            }
        }
    }
}

fn invalid_state(err: StateMachineError, operation: &'static str) -> BridgeError {
    match err {
        StateMachineError::InvalidTransition { state, .. } => {
            BridgeError::InvalidState { state, operation }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
