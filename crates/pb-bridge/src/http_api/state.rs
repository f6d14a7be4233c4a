use std::sync::Arc;
use std::time::Duration;

use pb_agents::{BridgeOrchestrator, RequestQueue};

/// Shared state behind every handler.
pub struct ApiState {
    pub queue: RequestQueue,
    pub orchestrator: Arc<BridgeOrchestrator>,
    /// How long `POST /ask` waits for its answer.
    pub ask_timeout: Duration,
    pub service: String,
}

impl ApiState {
    pub fn new(queue: RequestQueue, orchestrator: Arc<BridgeOrchestrator>) -> Self {
        Self {
            queue,
            orchestrator,
            ask_timeout: Duration::from_secs(900),
            service: "prompt-bridge".into(),
        }
    }

    pub fn with_ask_timeout(mut self, ask_timeout: Duration) -> Self {
        self.ask_timeout = ask_timeout;
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}
