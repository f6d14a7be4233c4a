use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use pb_core::agent::{AgentAuthProbe, AgentFactory, AgentPort, CriticalKind};
use pb_core::config::Config;
use pb_core::error::BridgeError;
use pb_core::types::{AuthState, AuthStatus, Credentials};
use pb_harness::circuit_breaker::{
    BreakerState, RestartBreaker, RestartLedger, RestartPolicy, RestartRefused,
};

use crate::deadline::bounded;
use crate::queue::PromptExecutor;
use crate::state_machine::AuthStateMachine;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub submit_timeout: Duration,
    pub step_timeout: Duration,
    pub restart: RestartPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(180),
            step_timeout: Duration::from_secs(60),
            restart: RestartPolicy::default(),
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            submit_timeout: cfg.agent.submit_timeout(),
            step_timeout: cfg.agent.step_timeout(),
            restart: RestartPolicy {
                max_restarts: cfg.restart.max_restarts,
                cooldown: cfg.restart.cooldown(),
            },
        }
    }
}

/// The agent instance plus everything only touched while it is held.
struct AgentSlot {
    agent: Box<dyn AgentPort>,
    initialized: bool,
    credentials: Option<Credentials>,
    /// Set when the agent failed critically outside a prompt submission
    /// (startup, login, code step). The next request or login spends a
    /// restart on it instead of talking to the suspect instance again.
    broken: Option<(CriticalKind, String)>,
}

impl AgentSlot {
    /// Remember a critical failure and pass the result through.
    fn note<T>(&mut self, result: Result<T, BridgeError>) -> Result<T, BridgeError> {
        if let Err(BridgeError::CriticalAgentFailure { kind, message }) = &result {
            self.broken = Some((*kind, message.clone()));
        }
        result
    }
}

/// Sole owner of the agent session.
///
/// Every agent operation (submit, login step, restart) happens while the
/// slot mutex is held, so at most one is ever in progress. Auth status and
/// the restart ledger are readable without waiting for the slot.
pub struct BridgeOrchestrator {
    factory: Arc<dyn AgentFactory>,
    slot: Mutex<AgentSlot>,
    auth: AuthStateMachine,
    breaker: RestartBreaker,
    config: OrchestratorConfig,
}

impl BridgeOrchestrator {
    /// `credentials` are used for automatic login, both on first use and
    /// after every restart. Without them login waits for
    /// [`begin_authentication`](Self::begin_authentication).
    pub fn new(
        factory: Arc<dyn AgentFactory>,
        config: OrchestratorConfig,
        credentials: Option<Credentials>,
    ) -> Self {
        let agent = factory.create();
        Self {
            factory,
            slot: Mutex::new(AgentSlot {
                agent,
                initialized: false,
                credentials,
                broken: None,
            }),
            auth: AuthStateMachine::new(config.step_timeout),
            breaker: RestartBreaker::new(config.restart.clone()),
            config,
        }
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.auth.status()
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    pub fn auth(&self) -> &AuthStateMachine {
        &self.auth
    }

    pub async fn restart_ledger(&self) -> RestartLedger {
        self.breaker.ledger().await
    }

    pub async fn breaker_state(&self) -> BreakerState {
        self.breaker.state().await
    }

    /// Bring the agent up and, with credentials at hand, log in. Returns the
    /// auth state reached; `AwaitingCode` means an operator has to supply the
    /// emailed code.
    pub async fn bootstrap(&self) -> Result<AuthState, BridgeError> {
        let mut slot = self.slot.lock().await;
        let result = self.bring_up(&mut slot).await;
        slot.note(result)
    }

    /// Log in with explicitly supplied credentials. They replace any
    /// configured ones for future restarts.
    ///
    /// When an earlier critical failure left the agent unusable, a restart
    /// is spent first and the fresh agent logs in with these credentials.
    pub async fn begin_authentication(
        &self,
        credentials: Credentials,
    ) -> Result<AuthState, BridgeError> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "email and password are required".into(),
            ));
        }
        let state = self.auth.state();
        if !matches!(state, AuthState::NotAuthenticated | AuthState::Failed) {
            return Err(BridgeError::InvalidState {
                state,
                operation: "begin authentication",
            });
        }

        let mut slot = self.slot.lock().await;
        if let Some((kind, message)) = slot.broken.clone() {
            slot.credentials = Some(credentials);
            self.recover(&mut slot, kind, message).await?;
            return Ok(self.auth.state());
        }

        let result = match self.ensure_initialized(&mut slot).await {
            Ok(()) => self.auth.begin(slot.agent.as_mut(), &credentials).await,
            Err(e) => Err(e),
        };
        if matches!(result, Ok(_) | Err(BridgeError::CriticalAgentFailure { .. })) {
            slot.credentials = Some(credentials);
        }
        slot.note(result)
    }

    /// Forward the out-of-band verification code. Checked against the auth
    /// state before waiting for the slot, so a misplaced call fails fast.
    pub async fn provide_code(&self, code: &str) -> Result<AuthState, BridgeError> {
        if code.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("code is required".into()));
        }
        let state = self.auth.state();
        if state != AuthState::AwaitingCode {
            return Err(BridgeError::InvalidState {
                state,
                operation: "provide a verification code",
            });
        }

        let mut slot = self.slot.lock().await;
        let result = self.auth.provide_code(slot.agent.as_mut(), code).await;
        slot.note(result)
    }

    /// Submit one prompt, restarting the agent at most once on a critical
    /// failure.
    pub async fn execute(&self, prompt: &str) -> Result<String, BridgeError> {
        let mut slot = self.slot.lock().await;

        let (kind, message) = match self.attempt(&mut slot, prompt).await {
            Err(BridgeError::CriticalAgentFailure { kind, message }) => (kind, message),
            other => return other,
        };

        let restart = self.recover(&mut slot, kind, message).await?;
        info!(restart, "retrying request on fresh agent");
        self.attempt(&mut slot, prompt).await
    }

    /// Stop the agent session. Waits for an in-flight operation to finish.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if !slot.initialized {
            return;
        }
        if let Err(failure) = bounded(self.config.step_timeout, "shutdown", slot.agent.shutdown()).await
        {
            warn!(error = %failure, "agent did not shut down cleanly");
        }
        slot.initialized = false;
        self.auth.set_agent_initialized(false);
        info!("agent session stopped");
    }

    // ------------------------------------------------------------------
    // Internals (slot held)
    // ------------------------------------------------------------------

    async fn attempt(&self, slot: &mut AgentSlot, prompt: &str) -> Result<String, BridgeError> {
        if let Some((kind, message)) = slot.broken.clone() {
            return Err(BridgeError::CriticalAgentFailure { kind, message });
        }
        let ready = self.bring_up(slot).await;
        let state = slot.note(ready)?;
        if state != AuthState::Completed {
            return Err(BridgeError::NotAuthenticated(state));
        }

        let answer = bounded(self.config.submit_timeout, "submit", slot.agent.submit(prompt)).await?;
        Ok(answer)
    }

    /// Initialize if needed and log in when credentials allow it.
    async fn bring_up(&self, slot: &mut AgentSlot) -> Result<AuthState, BridgeError> {
        self.ensure_initialized(slot).await?;
        self.login_if_possible(slot).await?;
        Ok(self.auth.state())
    }

    /// Spend one restart on a critical failure. Refusals come back as
    /// errors: the original failure inside the cooldown, a fatal one past
    /// the limit.
    async fn recover(
        &self,
        slot: &mut AgentSlot,
        kind: CriticalKind,
        message: String,
    ) -> Result<u32, BridgeError> {
        warn!(%kind, %message, "critical agent failure");

        let restart = match self.breaker.try_admit().await {
            Ok(restart) => restart,
            Err(RestartRefused::LimitExceeded { restarts, max }) => {
                error!(restarts, max, "agent cannot be recovered automatically");
                return Err(BridgeError::RestartLimitExceeded { restarts, max });
            }
            Err(RestartRefused::Cooldown { remaining }) => {
                info!(?remaining, "restart cooling down, failing request");
                return Err(BridgeError::CriticalAgentFailure { kind, message });
            }
        };

        let restarted = self.restart(slot, restart).await;
        slot.note(restarted)?;
        Ok(restart)
    }

    async fn ensure_initialized(&self, slot: &mut AgentSlot) -> Result<(), BridgeError> {
        if slot.initialized {
            return Ok(());
        }
        bounded(self.config.step_timeout, "initialize", slot.agent.initialize()).await?;
        slot.initialized = true;
        self.auth.set_agent_initialized(true);
        info!("agent session initialized");
        Ok(())
    }

    async fn login_if_possible(&self, slot: &mut AgentSlot) -> Result<(), BridgeError> {
        if self.auth.state() != AuthState::NotAuthenticated {
            return Ok(());
        }
        match slot.credentials.clone() {
            Some(credentials) => {
                self.auth.begin(slot.agent.as_mut(), &credentials).await?;
            }
            None => debug!("no credentials configured, waiting for explicit login"),
        }
        Ok(())
    }

    /// Replace the agent with a fresh instance and restore its login.
    async fn restart(&self, slot: &mut AgentSlot, restart: u32) -> Result<(), BridgeError> {
        info!(
            restart,
            max = self.breaker.policy().max_restarts,
            "restarting agent session"
        );
        if let Err(failure) = bounded(self.config.step_timeout, "shutdown", slot.agent.shutdown()).await
        {
            warn!(error = %failure, "old agent did not shut down cleanly");
        }

        let was_completed = self.auth.state() == AuthState::Completed;
        slot.agent = self.factory.create();
        slot.initialized = false;
        slot.broken = None;
        self.auth.set_agent_initialized(false);
        self.ensure_initialized(slot).await?;

        if was_completed {
            let probe = bounded(self.config.step_timeout, "auth probe", slot.agent.auth_probe()).await?;
            if probe == AgentAuthProbe::LoggedIn {
                info!("fresh agent kept its login");
                self.auth.set_agent_initialized(true);
                return Ok(());
            }
            debug!(?probe, "fresh agent lost its login");
        }

        self.auth.reset();
        self.auth.set_agent_initialized(true);
        self.login_if_possible(slot).await
    }
}

#[async_trait]
impl PromptExecutor for BridgeOrchestrator {
    async fn execute(&self, prompt: &str) -> Result<String, BridgeError> {
        BridgeOrchestrator::execute(self, prompt).await
    }
}
