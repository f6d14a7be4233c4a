use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use pb_agents::{BridgeOrchestrator, OrchestratorConfig, QueueOptions, RequestQueue};
use pb_bridge::http_api::{api_router_with_auth, ApiState};
use pb_core::agent::AgentFactory;
use pb_core::config::{Config, CredentialProvider};
use pb_harness::process_agent::ProcessAgentFactory;
use pb_harness::shutdown::{ShutdownReason, ShutdownSignal};

const AGENT_STOP_GRACE: Duration = Duration::from_secs(10);

/// The bridge service: one agent session, its queue and the HTTP API.
///
/// Runs until the `ShutdownSignal` fires, either from ctrl-c or because the
/// queue halted on a fatal failure.
pub struct Daemon {
    config: Config,
    shutdown: ShutdownSignal,
    orchestrator: Arc<BridgeOrchestrator>,
    queue: RequestQueue,
    api_state: Arc<ApiState>,
}

impl Daemon {
    /// Build a daemon driving the external agent program from `[agent]`.
    pub fn new(config: Config) -> Result<Self> {
        let factory = ProcessAgentFactory::from_config(&config.agent)
            .context("cannot build the agent adapter")?;
        Ok(Self::with_factory(config, Arc::new(factory)))
    }

    /// Build a daemon around any agent implementation.
    pub fn with_factory(config: Config, factory: Arc<dyn AgentFactory>) -> Self {
        let credentials = CredentialProvider::credentials(&config.credentials);
        if credentials.is_none() {
            warn!(
                email_env = %config.credentials.email_env,
                password_env = %config.credentials.password_env,
                "no agent credentials in environment, login must go through POST /auth"
            );
        }

        let orchestrator = Arc::new(BridgeOrchestrator::new(
            factory,
            OrchestratorConfig::from(&config),
            credentials,
        ));
        let queue = RequestQueue::new(
            orchestrator.clone(),
            QueueOptions {
                inter_request_pause: config.queue.inter_request_pause(),
            },
        );
        let api_state = Arc::new(
            ApiState::new(queue.clone(), orchestrator.clone())
                .with_ask_timeout(config.daemon.ask_timeout()),
        );

        Self {
            config,
            shutdown: ShutdownSignal::new(),
            orchestrator,
            queue,
            api_state,
        }
    }

    /// Returns a handle that can be used to trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn api_state(&self) -> &Arc<ApiState> {
        &self.api_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind to `[daemon] host:port` and serve until shutdown.
    pub async fn run(&self) -> Result<ShutdownReason> {
        let bind_addr = format!("{}:{}", self.config.daemon.host, self.config.daemon.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        self.run_with_listener(listener).await
    }

    /// Serve on an already-bound listener until shutdown, returning why it
    /// stopped.
    pub async fn run_with_listener(
        &self,
        listener: tokio::net::TcpListener,
    ) -> Result<ShutdownReason> {
        let addr = listener.local_addr().context("listener has no address")?;

        self.spawn_bootstrap();
        self.spawn_halt_watcher();

        let api_key = CredentialProvider::api_key(&self.config.daemon);
        if api_key.is_some() {
            info!("API key configured, authentication enabled");
        } else {
            warn!(env = %self.config.daemon.api_key_env, "no API key configured, API is open");
        }
        let router = api_router_with_auth(self.api_state.clone(), api_key);

        info!(%addr, "API server listening");
        let waiter = self.shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                waiter.wait().await;
            })
            .await
            .context("API server error")?;

        let reason = self.shutdown.reason().unwrap_or(ShutdownReason::Interrupted);
        if tokio::time::timeout(AGENT_STOP_GRACE, self.orchestrator.shutdown())
            .await
            .is_err()
        {
            warn!("agent still busy, abandoning it");
        }
        info!(?reason, "daemon stopped");
        Ok(reason)
    }

    /// Bring the agent up and log in with environment credentials in the
    /// background. Stops at `AwaitingCode` when a code is needed.
    fn spawn_bootstrap(&self) {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            match orchestrator.bootstrap().await {
                Ok(state) => info!(%state, "agent bootstrap finished"),
                Err(e) => warn!(error = %e, "agent bootstrap failed, will retry on first request"),
            }
        });
    }

    /// Turn a halted queue into a fatal shutdown.
    fn spawn_halt_watcher(&self) {
        let mut halted = self.queue.subscribe_halt();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let reason = match halted.wait_for(|reason| reason.is_some()).await {
                Ok(reason) => reason.clone().unwrap_or_default(),
                Err(_) => return,
            };
            error!(%reason, "request queue halted, shutting down");
            shutdown.trigger(ShutdownReason::Fatal(reason));
        });
    }
}
