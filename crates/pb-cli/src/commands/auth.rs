use std::time::Duration;

use pb_api_types::{AuthStatusResponse, AuthStepResponse, CodeRequest, LoginRequest};
use pb_core::poll::poll_until;

use super::{api_failure, friendly_error, Endpoint};

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub async fn fetch_status(endpoint: &Endpoint) -> anyhow::Result<AuthStatusResponse> {
    let resp = endpoint.get("/auth/status").send().await.map_err(friendly_error)?;
    if !resp.status().is_success() {
        return Err(api_failure(resp).await);
    }
    resp.json().await.map_err(friendly_error)
}

/// Run `auth status`.
pub async fn status(endpoint: &Endpoint) -> anyhow::Result<()> {
    let s = fetch_status(endpoint).await?;
    let mark = |b: bool| if b { "yes" } else { "no" };
    println!("Auth state:        {}", s.status);
    println!("Agent initialized: {}", mark(s.agent_initialized));
    println!("Email provided:    {}", mark(s.email_provided));
    println!("Password provided: {}", mark(s.password_provided));
    println!("Code provided:     {}", mark(s.code_provided));
    Ok(())
}

/// Run `auth login`.
pub async fn login(endpoint: &Endpoint, email: &str, password: &str) -> anyhow::Result<()> {
    let resp = endpoint
        .post("/auth")
        .json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .send()
        .await
        .map_err(friendly_error)?;
    if !resp.status().is_success() {
        return Err(api_failure(resp).await);
    }
    let step: AuthStepResponse = resp.json().await.map_err(friendly_error)?;
    println!("{} ({})", step.message, step.auth_state);
    Ok(())
}

/// Run `auth code`. With `wait`, a code the daemon has not confirmed yet is
/// followed by polling `/auth/status` until it reads `completed`.
pub async fn code(endpoint: &Endpoint, code: &str, wait: Option<Duration>) -> anyhow::Result<()> {
    let resp = endpoint
        .post("/auth/code")
        .json(&CodeRequest {
            code: code.to_string(),
        })
        .send()
        .await
        .map_err(friendly_error)?;

    if resp.status().is_success() {
        let step: AuthStepResponse = resp.json().await.map_err(friendly_error)?;
        println!("{} ({})", step.message, step.auth_state);
        return Ok(());
    }

    let pending = resp.status() == reqwest::StatusCode::BAD_REQUEST;
    let failure = api_failure(resp).await;
    let Some(wait) = wait.filter(|_| pending) else {
        return Err(failure);
    };

    println!("code not confirmed yet, waiting up to {}s", wait.as_secs());
    wait_for_completion(endpoint, wait).await?;
    println!("authenticated (completed)");
    Ok(())
}

/// Poll auth status until `completed`. Ends early on `failed`.
pub async fn wait_for_completion(endpoint: &Endpoint, wait: Duration) -> anyhow::Result<()> {
    let outcome = poll_until(wait, STATUS_POLL_INTERVAL, move || async move {
        match fetch_status(endpoint).await {
            Ok(s) if s.status == "completed" || s.status == "failed" => Some(s.status),
            _ => None,
        }
    })
    .await;

    match outcome {
        Ok(state) if state == "completed" => Ok(()),
        Ok(state) => anyhow::bail!("authentication ended in state {state}"),
        Err(timeout) => anyhow::bail!("authentication not confirmed: {timeout}"),
    }
}
