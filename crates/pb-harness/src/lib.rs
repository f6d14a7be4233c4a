//! Reliability infrastructure and agent adapters for the
//! prompt-bridge runtime.
//!
//! - [`circuit_breaker`] bounds automatic restarts of the agent session
//! - [`shutdown`] coordinates process-wide shutdown, including fatal halts
//! - [`process_agent`] drives an external automation program over a
//!   line-delimited JSON pipe

pub mod circuit_breaker;
pub mod process_agent;
pub mod shutdown;
