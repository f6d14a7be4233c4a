use pb_api_types::HealthResponse;

use super::{friendly_error, Endpoint};

/// Run the `health` subcommand and pretty-print the daemon's state.
///
/// A halted daemon answers 503 with a normal body; that is reported, not
/// treated as a transport failure.
pub async fn run(endpoint: &Endpoint) -> anyhow::Result<()> {
    let health = fetch(endpoint).await?;

    println!("{}  ({})", health.service, health.status);
    println!("{}", "-".repeat(40));
    println!("Queue size:     {}", health.queue_size);
    println!("Processing:     {}", health.processing);
    println!("Auth state:     {}", health.auth_state);
    println!("Restarts:       {}", health.restart_count);
    if let Some(current) = &health.current_request {
        println!("In flight:      {} {:?} (since {})", current.id, current.preview, current.started_at);
    }
    if let Some(reason) = &health.halt_reason {
        anyhow::bail!("bridge halted: {reason}");
    }
    Ok(())
}

pub async fn fetch(endpoint: &Endpoint) -> anyhow::Result<HealthResponse> {
    let resp = endpoint.get("/health").send().await.map_err(friendly_error)?;
    let status = resp.status();
    if !status.is_success() && status != reqwest::StatusCode::SERVICE_UNAVAILABLE {
        anyhow::bail!("Failed to fetch health (HTTP {status})");
    }
    resp.json().await.map_err(friendly_error)
}
