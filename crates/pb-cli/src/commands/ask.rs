use pb_api_types::{AskRequest, AskResponse};

use super::{api_failure, friendly_error, Endpoint};

/// Run the `ask` subcommand: send one prompt and print the answer.
pub async fn run(endpoint: &Endpoint, prompt: &str) -> anyhow::Result<()> {
    let answer = ask(endpoint, prompt).await?;
    println!("{answer}");
    Ok(())
}

pub async fn ask(endpoint: &Endpoint, prompt: &str) -> anyhow::Result<String> {
    let resp = endpoint
        .post("/ask")
        .json(&AskRequest {
            prompt: prompt.to_string(),
        })
        .send()
        .await
        .map_err(friendly_error)?;

    if !resp.status().is_success() {
        return Err(api_failure(resp).await);
    }
    let body: AskResponse = resp.json().await.map_err(friendly_error)?;
    Ok(body.answer)
}
