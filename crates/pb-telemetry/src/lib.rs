//! Logging and request correlation for prompt-bridge services.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Tracing**: `X-Request-Id` middleware that wraps each HTTP request in a span

pub mod logging;
pub mod tracing_setup;
