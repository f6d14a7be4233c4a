//! Shared vocabulary for the prompt-bridge services.
//!
//! - [`types`]: requests, authentication state and request failures
//! - [`agent`]: the [`agent::AgentPort`] trait the orchestrator drives
//! - [`error`]: the [`error::BridgeError`] taxonomy
//! - [`config`]: TOML configuration and env-var credential resolution
//! - [`poll`]: bounded poll-with-timeout primitive

pub mod agent;
pub mod config;
pub mod error;
pub mod poll;
pub mod types;
