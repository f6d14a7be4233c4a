use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pb_core::agent::{
    AgentAuthProbe, AgentFailure, AgentPort, AuthStep, CriticalKind, StepOutcome,
};
use pb_core::config::Config;
use pb_daemon::daemon::Daemon;
use pb_harness::shutdown::ShutdownReason;

struct FlakyAgent {
    broken: Arc<AtomicBool>,
}

#[async_trait]
impl AgentPort for FlakyAgent {
    async fn initialize(&mut self) -> Result<(), AgentFailure> {
        Ok(())
    }

    async fn authenticate_step(&mut self, _step: AuthStep) -> Result<StepOutcome, AgentFailure> {
        Ok(StepOutcome::Authenticated)
    }

    async fn auth_probe(&mut self) -> Result<AgentAuthProbe, AgentFailure> {
        Ok(AgentAuthProbe::LoggedOut)
    }

    async fn submit(&mut self, prompt: &str) -> Result<String, AgentFailure> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(AgentFailure::critical(CriticalKind::RetriesExhausted, "gave up"));
        }
        Ok(prompt.to_uppercase())
    }

    async fn shutdown(&mut self) -> Result<(), AgentFailure> {
        Ok(())
    }
}

fn test_config(tag: &str) -> Config {
    let mut config = Config::default();
    config.queue.inter_request_pause_ms = 0;
    config.restart.max_restarts = 1;
    config.restart.cooldown_secs = 0;
    config.credentials.email_env = format!("PB_DAEMON_TEST_EMAIL_{tag}");
    config.credentials.password_env = format!("PB_DAEMON_TEST_PASSWORD_{tag}");
    config.daemon.api_key_env = format!("PB_DAEMON_TEST_API_KEY_{tag}");
    std::env::set_var(&config.credentials.email_env, "bot@example.com");
    std::env::set_var(&config.credentials.password_env, "pw");
    config
}

async fn start(tag: &str) -> (Arc<Daemon>, String, Arc<AtomicBool>, tokio::task::JoinHandle<ShutdownReason>) {
    let broken = Arc::new(AtomicBool::new(false));
    let flag = broken.clone();
    let factory = move || -> Box<dyn AgentPort> {
        Box::new(FlakyAgent {
            broken: flag.clone(),
        })
    };
    let daemon = Arc::new(Daemon::with_factory(test_config(tag), Arc::new(factory)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let runner = daemon.clone();
    let handle = tokio::spawn(async move { runner.run_with_listener(listener).await.unwrap() });
    (daemon, base, broken, handle)
}

#[tokio::test]
async fn serves_prompts_and_stops_on_interrupt() {
    let (daemon, base, _broken, handle) = start("INTERRUPT").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/ask"))
        .json(&serde_json::json!({"prompt": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "HELLO");

    let status: serde_json::Value = client
        .get(format!("{base}/auth/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "completed");

    daemon.shutdown_handle().trigger(ShutdownReason::Interrupted);
    let reason = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon stops")
        .unwrap();
    assert_eq!(reason, ShutdownReason::Interrupted);
}

#[tokio::test]
async fn exceeding_the_restart_limit_is_a_fatal_shutdown() {
    let (_daemon, base, broken, handle) = start("FATAL").await;
    let client = reqwest::Client::new();
    broken.store(true, Ordering::SeqCst);

    for _ in 0..2 {
        let _ = client
            .post(format!("{base}/ask"))
            .json(&serde_json::json!({"prompt": "hello"}))
            .send()
            .await;
    }

    let reason = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon stops on its own")
        .unwrap();
    assert!(reason.is_fatal(), "got {reason:?}");
}
