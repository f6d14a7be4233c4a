//! [`AgentPort`] adapter for an external automation program.
//!
//! The program is spawned with piped stdin/stdout and spoken to in
//! newline-delimited JSON: every request is one object on one line, every
//! reply is one object on one line. The adapter never issues a second request
//! before the first reply has been read.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use pb_core::agent::{
    AgentAuthProbe, AgentFactory, AgentFailure, AgentPort, AuthStep, CriticalKind, StepOutcome,
};
use pb_core::config::AgentConfig;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProcessAgentError {
    #[error("agent.command is not configured")]
    MissingCommand,
    #[error("failed to spawn agent process `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("agent pipe error: {0}")]
    Io(#[from] std::io::Error),
    #[error("agent protocol error: {0}")]
    Protocol(String),
}

impl From<ProcessAgentError> for AgentFailure {
    fn from(err: ProcessAgentError) -> Self {
        let kind = match err {
            ProcessAgentError::MissingCommand | ProcessAgentError::Spawn { .. } => {
                CriticalKind::SessionUninitialized
            }
            ProcessAgentError::Io(_) | ProcessAgentError::Protocol(_) => CriticalKind::SessionLost,
        };
        AgentFailure::critical(kind, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireRequest<'a> {
    Initialize,
    AuthStep { step: &'a str, value: &'a str },
    AuthProbe,
    Submit { prompt: &'a str },
    Shutdown,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum WireOutcome {
    Accepted,
    CodeRequired,
    Authenticated,
    Rejected,
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    ok: bool,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    outcome: Option<WireOutcome>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    probe: Option<AgentAuthProbe>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    critical: Option<CriticalKind>,
}

impl WireReply {
    /// Turn `ok: false` replies into failures. An explicit `critical` kind is
    /// trusted; otherwise the message is classified heuristically.
    fn into_result(self) -> Result<Self, AgentFailure> {
        if self.ok {
            return Ok(self);
        }
        let message = self
            .error
            .clone()
            .unwrap_or_else(|| "agent reported an unspecified error".to_string());
        Err(match self.critical {
            Some(kind) => AgentFailure::critical(kind, message),
            None => AgentFailure::from_message(message),
        })
    }
}

// ---------------------------------------------------------------------------
// ProcessAgent
// ---------------------------------------------------------------------------

struct Pipes {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

pub struct ProcessAgent {
    command: String,
    args: Vec<String>,
    pipes: Option<Pipes>,
}

impl ProcessAgent {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            pipes: None,
        }
    }

    fn spawn(&mut self) -> Result<(), ProcessAgentError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessAgentError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProcessAgentError::Protocol("child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessAgentError::Protocol("child stdout not captured".into()))?;

        info!(command = %self.command, pid = ?child.id(), "agent process spawned");
        self.pipes = Some(Pipes {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        });
        Ok(())
    }

    async fn exchange(&mut self, request: &WireRequest<'_>) -> Result<WireReply, AgentFailure> {
        let pipes = self.pipes.as_mut().ok_or_else(|| {
            AgentFailure::critical(
                CriticalKind::SessionUninitialized,
                "agent process not started",
            )
        })?;

        let mut line = serde_json::to_string(request)
            .map_err(|e| ProcessAgentError::Protocol(e.to_string()))?;
        line.push('\n');
        pipes
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(ProcessAgentError::from)?;
        pipes.stdin.flush().await.map_err(ProcessAgentError::from)?;

        let reply = pipes
            .stdout
            .next_line()
            .await
            .map_err(ProcessAgentError::from)?
            .ok_or_else(|| ProcessAgentError::Protocol("agent process closed its output".into()))?;
        debug!(bytes = reply.len(), "agent reply received");

        let reply: WireReply = serde_json::from_str(&reply)
            .map_err(|e| ProcessAgentError::Protocol(format!("unparsable reply: {e}")))?;
        reply.into_result()
    }
}

#[async_trait]
impl AgentPort for ProcessAgent {
    async fn initialize(&mut self) -> Result<(), AgentFailure> {
        if self.pipes.is_none() {
            self.spawn()?;
        }
        self.exchange(&WireRequest::Initialize).await.map(|_| ())
    }

    async fn authenticate_step(&mut self, step: AuthStep) -> Result<StepOutcome, AgentFailure> {
        let value = match &step {
            AuthStep::Email(email) => email.as_str(),
            AuthStep::Password(secret) => secret.expose(),
            AuthStep::Code(code) => code.as_str(),
        };
        let reply = self
            .exchange(&WireRequest::AuthStep {
                step: step.label(),
                value,
            })
            .await?;

        Ok(match reply.outcome {
            Some(WireOutcome::Accepted) | None => StepOutcome::Accepted,
            Some(WireOutcome::CodeRequired) => StepOutcome::CodeRequired,
            Some(WireOutcome::Authenticated) => StepOutcome::Authenticated,
            Some(WireOutcome::Rejected) => {
                StepOutcome::Rejected(reply.reason.unwrap_or_else(|| "rejected".into()))
            }
            Some(WireOutcome::Unsupported) => StepOutcome::Unsupported,
        })
    }

    async fn auth_probe(&mut self) -> Result<AgentAuthProbe, AgentFailure> {
        let reply = self.exchange(&WireRequest::AuthProbe).await?;
        reply
            .probe
            .ok_or_else(|| ProcessAgentError::Protocol("auth_probe reply without probe".into()).into())
    }

    async fn submit(&mut self, prompt: &str) -> Result<String, AgentFailure> {
        let reply = self.exchange(&WireRequest::Submit { prompt }).await?;
        reply
            .answer
            .ok_or_else(|| ProcessAgentError::Protocol("submit reply without answer".into()).into())
    }

    async fn shutdown(&mut self) -> Result<(), AgentFailure> {
        if self.pipes.is_none() {
            return Ok(());
        }
        if let Err(failure) = self.exchange(&WireRequest::Shutdown).await {
            warn!(error = %failure, "agent did not acknowledge shutdown");
        }
        if let Some(mut pipes) = self.pipes.take() {
            if let Err(e) = pipes.child.kill().await {
                debug!(error = %e, "agent process already exited");
            }
        }
        info!(command = %self.command, "agent process stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds a fresh [`ProcessAgent`] from `[agent]` config for every restart.
#[derive(Debug, Clone)]
pub struct ProcessAgentFactory {
    command: String,
    args: Vec<String>,
}

impl ProcessAgentFactory {
    pub fn from_config(cfg: &AgentConfig) -> Result<Self, ProcessAgentError> {
        let command = cfg
            .command
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProcessAgentError::MissingCommand)?;
        Ok(Self {
            command,
            args: cfg.args.clone(),
        })
    }
}

impl AgentFactory for ProcessAgentFactory {
    fn create(&self) -> Box<dyn AgentPort> {
        Box::new(ProcessAgent::new(self.command.clone(), self.args.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_serialize_one_object_per_op() {
        let json = serde_json::to_string(&WireRequest::Submit { prompt: "hi" }).unwrap();
        assert_eq!(json, r#"{"op":"submit","prompt":"hi"}"#);
        let json = serde_json::to_string(&WireRequest::Initialize).unwrap();
        assert_eq!(json, r#"{"op":"initialize"}"#);
    }

    #[test]
    fn explicit_critical_kind_is_trusted() {
        let reply: WireReply =
            serde_json::from_str(r#"{"ok":false,"error":"page froze","critical":"hard_timeout"}"#)
                .unwrap();
        let failure = reply.into_result().unwrap_err();
        assert_eq!(
            failure,
            AgentFailure::critical(CriticalKind::HardTimeout, "page froze")
        );
    }

    #[test]
    fn unmarked_errors_fall_back_to_classification() {
        let reply: WireReply =
            serde_json::from_str(r#"{"ok":false,"error":"send button not found"}"#).unwrap();
        assert!(!reply.into_result().unwrap_err().is_critical());
    }

    #[test]
    fn factory_requires_a_command() {
        let err = ProcessAgentFactory::from_config(&AgentConfig::default()).unwrap_err();
        assert!(matches!(err, ProcessAgentError::MissingCommand));
    }

    #[tokio::test]
    async fn calls_before_initialize_are_critical() {
        let mut agent = ProcessAgent::new("unused", vec![]);
        let failure = agent.submit("hello").await.unwrap_err();
        assert!(matches!(
            failure,
            AgentFailure::Critical {
                kind: CriticalKind::SessionUninitialized,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn talks_to_a_line_protocol_child() {
        let script = r#"while read -r line; do
  case "$line" in
    *'"op":"submit"'*) echo '{"ok":true,"answer":"pong"}' ;;
    *'"op":"auth_probe"'*) echo '{"ok":true,"probe":"logged_in"}' ;;
    *) echo '{"ok":true}' ;;
  esac
done"#;
        let mut agent = ProcessAgent::new("sh", vec!["-c".into(), script.into()]);
        agent.initialize().await.expect("initialize");
        assert_eq!(agent.submit("ping").await.expect("submit"), "pong");
        assert_eq!(
            agent.auth_probe().await.expect("probe"),
            AgentAuthProbe::LoggedIn
        );
        agent.shutdown().await.expect("shutdown");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exited_child_is_a_lost_session() {
        let mut agent = ProcessAgent::new("sh", vec!["-c".into(), "exit 0".into()]);
        let failure = agent.initialize().await.unwrap_err();
        assert!(matches!(
            failure,
            AgentFailure::Critical {
                kind: CriticalKind::SessionLost,
                ..
            }
        ));
    }
}
