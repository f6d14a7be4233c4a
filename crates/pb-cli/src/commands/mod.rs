pub mod ask;
pub mod auth;
pub mod health;

use pb_api_types::ErrorBody;

/// Where the daemon lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl Endpoint {
    pub fn new(base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client: api_client(),
        }
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(format!("{}{path}", self.base)))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(format!("{}{path}", self.base)))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("X-API-Key", key),
            None => req,
        }
    }
}

/// Build a reqwest client, handling connection errors with a friendly message.
pub fn api_client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Map common reqwest errors to user-friendly messages.
pub fn friendly_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_connect() {
        anyhow::anyhow!(
            "Could not connect to the prompt-bridge daemon. Is it running?\n  \
             (hint: start it with `pb-daemon` or check --api-url)"
        )
    } else if err.is_timeout() {
        anyhow::anyhow!("Request timed out. The daemon may be overloaded.")
    } else {
        anyhow::anyhow!("API request failed: {err}")
    }
}

/// Turn a non-2xx response into an error carrying the daemon's message.
pub async fn api_failure(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => anyhow::anyhow!("{} (HTTP {status})", body.error),
        Err(_) => anyhow::anyhow!("request failed (HTTP {status})"),
    }
}
