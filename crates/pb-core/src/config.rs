use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::Credentials;

/// Top-level configuration loaded from `~/.prompt-bridge/config.toml`.
///
/// **Security**: this struct never stores passwords or API keys. It only
/// names the environment variables that hold them; see
/// [`CredentialProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl Config {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path. The file must exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.general.log_format.as_str() {
            "human" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "general.log_format must be \"human\" or \"json\", got {other:?}"
                )))
            }
        }
        if self.daemon.ask_timeout_secs == 0 {
            return Err(ConfigError::Invalid("daemon.ask_timeout_secs must be > 0".into()));
        }
        if self.agent.submit_timeout_secs == 0 {
            return Err(ConfigError::Invalid("agent.submit_timeout_secs must be > 0".into()));
        }
        if self.agent.step_timeout_secs == 0 {
            return Err(ConfigError::Invalid("agent.step_timeout_secs must be > 0".into()));
        }
        if self.restart.max_restarts == 0 {
            return Err(ConfigError::Invalid("restart.max_restarts must be > 0".into()));
        }
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("PROMPT_BRIDGE_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".prompt-bridge")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"human"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default = "default_daemon_port")]
    pub port: u16,
    /// Upper bound on how long `POST /ask` waits for its answer.
    #[serde(default = "default_ask_timeout_secs")]
    pub ask_timeout_secs: u64,
    /// Env var holding the HTTP API key. Auth is off when it is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl DaemonConfig {
    pub fn ask_timeout(&self) -> Duration {
        Duration::from_secs(self.ask_timeout_secs)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_daemon_port(),
            ask_timeout_secs: default_ask_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_daemon_host() -> String {
    "0.0.0.0".into()
}
fn default_daemon_port() -> u16 {
    8010
}
fn default_ask_timeout_secs() -> u64 {
    900
}
fn default_api_key_env() -> String {
    "PROMPT_BRIDGE_API_KEY".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause after every completed request before the next one starts.
    #[serde(default = "default_inter_request_pause_ms")]
    pub inter_request_pause_ms: u64,
}

impl QueueConfig {
    pub fn inter_request_pause(&self) -> Duration {
        Duration::from_millis(self.inter_request_pause_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inter_request_pause_ms: default_inter_request_pause_ms(),
        }
    }
}

fn default_inter_request_pause_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Program implementing the line-delimited JSON agent protocol.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Hard deadline for one `submit`; exceeding it is a critical failure.
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
    /// Deadline for every other agent call (initialize, login steps).
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

impl AgentConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            submit_timeout_secs: default_submit_timeout_secs(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

fn default_submit_timeout_secs() -> u64 {
    180
}
fn default_step_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Automatic restarts allowed for the whole process lifetime.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Minimum spacing between two restarts.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl RestartConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_max_restarts() -> u32 {
    3
}
fn default_cooldown_secs() -> u64 {
    60
}

/// Names of the env vars holding the agent account's login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_email_env")]
    pub email_env: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            email_env: default_email_env(),
            password_env: default_password_env(),
        }
    }
}

fn default_email_env() -> String {
    "EMAIL_ADDRESS".into()
}
fn default_password_env() -> String {
    "PASSWORD".into()
}

// ---------------------------------------------------------------------------
// CredentialProvider
// ---------------------------------------------------------------------------

/// Resolves secrets from environment variables at runtime.
///
/// Config stores the env var *names*; this provider reads the values on
/// demand so they are never serialized.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Account credentials, or `None` when either variable is unset or empty.
    pub fn credentials(cfg: &CredentialsConfig) -> Option<Credentials> {
        let email = Self::non_empty(&cfg.email_env)?;
        let password = Self::non_empty(&cfg.password_env)?;
        Some(Credentials::new(email, password))
    }

    /// The HTTP API key, or `None` for an open (development) API.
    pub fn api_key(cfg: &DaemonConfig) -> Option<String> {
        Self::non_empty(&cfg.api_key_env)
    }

    fn non_empty(var: &str) -> Option<String> {
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.daemon.port, 8010);
        assert_eq!(cfg.queue.inter_request_pause(), Duration::from_secs(1));
        assert_eq!(cfg.agent.submit_timeout(), Duration::from_secs(180));
        assert_eq!(cfg.restart.max_restarts, 3);
        assert_eq!(cfg.restart.cooldown(), Duration::from_secs(60));
        assert_eq!(cfg.credentials.email_env, "EMAIL_ADDRESS");
        cfg.validate().expect("defaults validate");
    }

    #[test]
    fn credentials_require_both_variables() {
        let cfg = CredentialsConfig {
            email_env: "PB_TEST_EMAIL_ONLY".into(),
            password_env: "PB_TEST_PASSWORD_UNSET".into(),
        };
        std::env::set_var("PB_TEST_EMAIL_ONLY", "me@example.com");
        std::env::remove_var("PB_TEST_PASSWORD_UNSET");
        assert!(CredentialProvider::credentials(&cfg).is_none());

        std::env::set_var("PB_TEST_PASSWORD_UNSET", "pw");
        let creds = CredentialProvider::credentials(&cfg).expect("both set");
        assert_eq!(creds.email, "me@example.com");
        assert_eq!(creds.password.expose(), "pw");
        std::env::remove_var("PB_TEST_EMAIL_ONLY");
        std::env::remove_var("PB_TEST_PASSWORD_UNSET");
    }
}
