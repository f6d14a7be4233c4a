//! The prompt-bridge service process: wires config, the agent adapter, the
//! queue and the HTTP API together and owns their lifecycle.

pub mod daemon;
pub mod environment;
