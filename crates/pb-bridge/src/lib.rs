//! HTTP front end of the prompt bridge.
//!
//! - [`http_api`] -- axum router for `/ask`, `/health` and `/auth*`
//! - [`auth`] -- API key middleware
//! - [`api_error`] -- error-to-status mapping

pub mod api_error;
pub mod auth;
pub mod http_api;
