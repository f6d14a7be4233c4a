#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use pb_agents::{BridgeOrchestrator, OrchestratorConfig, QueueOptions, RequestQueue};
use pb_core::agent::{AgentAuthProbe, AgentFactory, AgentFailure, AgentPort, AuthStep, StepOutcome};
use pb_core::types::Credentials;
use pb_harness::circuit_breaker::RestartPolicy;

/// One observed `submit`.
#[derive(Debug, Clone)]
pub struct Call {
    pub prompt: String,
    pub entered: Instant,
    pub exited: Instant,
}

/// Behaviour shared by every agent instance the factory hands out, so a
/// restarted agent keeps following the same script.
#[derive(Default)]
pub struct Script {
    pub latency: Mutex<HashMap<String, Duration>>,
    pub submit_failures: Mutex<VecDeque<AgentFailure>>,
    pub always_fail: Mutex<Option<AgentFailure>>,
    pub init_failures: Mutex<VecDeque<AgentFailure>>,
    pub probe_failures: Mutex<VecDeque<AgentFailure>>,
    pub code_failures: Mutex<VecDeque<AgentFailure>>,
    /// Password step answers `CodeRequired` and waits for `valid_code`.
    pub require_code: bool,
    pub valid_code: String,
    pub reject_password: bool,
    /// Restarted agents come up already logged in.
    pub sticky_login: bool,
    pub calls: Mutex<Vec<Call>>,
    pub steps: Mutex<Vec<String>>,
    pub created: AtomicU32,
    pub initialized: AtomicU32,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_code(code: &str) -> Arc<Self> {
        Arc::new(Self {
            require_code: true,
            valid_code: code.to_string(),
            ..Self::default()
        })
    }

    pub fn set_latency(&self, prompt: &str, latency: Duration) {
        self.latency.lock().unwrap().insert(prompt.to_string(), latency);
    }

    pub fn fail_next_submit(&self, failure: AgentFailure) {
        self.submit_failures.lock().unwrap().push_back(failure);
    }

    pub fn fail_every_submit(&self, failure: AgentFailure) {
        *self.always_fail.lock().unwrap() = Some(failure);
    }

    pub fn fail_next_probe(&self, failure: AgentFailure) {
        self.probe_failures.lock().unwrap().push_back(failure);
    }

    pub fn fail_next_code(&self, failure: AgentFailure) {
        self.code_failures.lock().unwrap().push_back(failure);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.prompt.clone()).collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

pub struct MockAgent {
    script: Arc<Script>,
    logged_in: bool,
    awaiting_code: bool,
}

#[async_trait]
impl AgentPort for MockAgent {
    async fn initialize(&mut self) -> Result<(), AgentFailure> {
        if let Some(failure) = self.script.init_failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        self.script.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn authenticate_step(&mut self, step: AuthStep) -> Result<StepOutcome, AgentFailure> {
        self.script.steps.lock().unwrap().push(step.label().to_string());
        if matches!(step, AuthStep::Code(_)) {
            if let Some(failure) = self.script.code_failures.lock().unwrap().pop_front() {
                return Err(failure);
            }
        }
        Ok(match step {
            AuthStep::Email(_) => StepOutcome::Accepted,
            AuthStep::Password(_) if self.script.reject_password => {
                StepOutcome::Rejected("wrong password".into())
            }
            AuthStep::Password(_) if self.script.require_code => {
                self.awaiting_code = true;
                StepOutcome::CodeRequired
            }
            AuthStep::Password(_) => {
                self.logged_in = true;
                StepOutcome::Authenticated
            }
            AuthStep::Code(code) if self.awaiting_code && code == self.script.valid_code => {
                self.awaiting_code = false;
                self.logged_in = true;
                StepOutcome::Accepted
            }
            AuthStep::Code(_) => StepOutcome::Rejected("wrong code".into()),
        })
    }

    async fn auth_probe(&mut self) -> Result<AgentAuthProbe, AgentFailure> {
        if let Some(failure) = self.script.probe_failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        Ok(if self.logged_in {
            AgentAuthProbe::LoggedIn
        } else if self.awaiting_code {
            AgentAuthProbe::CodeRequired
        } else {
            AgentAuthProbe::LoggedOut
        })
    }

    async fn submit(&mut self, prompt: &str) -> Result<String, AgentFailure> {
        let active = self.script.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.max_active.fetch_max(active, Ordering::SeqCst);
        let entered = Instant::now();

        let latency = self.script.latency.lock().unwrap().get(prompt).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self
            .script
            .submit_failures
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.script.always_fail.lock().unwrap().clone());

        self.script.active.fetch_sub(1, Ordering::SeqCst);
        self.script.calls.lock().unwrap().push(Call {
            prompt: prompt.to_string(),
            entered,
            exited: Instant::now(),
        });
        match failure {
            Some(failure) => Err(failure),
            None => Ok(format!("answer to {prompt}")),
        }
    }

    async fn shutdown(&mut self) -> Result<(), AgentFailure> {
        Ok(())
    }
}

pub struct MockFactory(pub Arc<Script>);

impl AgentFactory for MockFactory {
    fn create(&self) -> Box<dyn AgentPort> {
        let first = self.0.created.fetch_add(1, Ordering::SeqCst) == 0;
        Box::new(MockAgent {
            script: Arc::clone(&self.0),
            logged_in: !first && self.0.sticky_login,
            awaiting_code: false,
        })
    }
}

pub fn creds() -> Credentials {
    Credentials::new("bot@example.com", "hunter2")
}

pub fn config(max_restarts: u32, cooldown: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        submit_timeout: Duration::from_secs(5),
        step_timeout: Duration::from_secs(5),
        restart: RestartPolicy {
            max_restarts,
            cooldown,
        },
    }
}

pub fn orchestrator(
    script: &Arc<Script>,
    config: OrchestratorConfig,
    credentials: Option<Credentials>,
) -> Arc<BridgeOrchestrator> {
    Arc::new(BridgeOrchestrator::new(
        Arc::new(MockFactory(Arc::clone(script))),
        config,
        credentials,
    ))
}

pub fn queue_over(orchestrator: &Arc<BridgeOrchestrator>, pause: Duration) -> RequestQueue {
    RequestQueue::new(
        orchestrator.clone(),
        QueueOptions {
            inter_request_pause: pause,
        },
    )
}
