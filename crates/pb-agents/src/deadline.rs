use std::future::Future;
use std::time::Duration;

use pb_core::agent::{AgentFailure, CriticalKind};

/// Run an agent call under a hard deadline. Overrunning it is critical: the
/// session is assumed wedged.
pub(crate) async fn bounded<T, F>(limit: Duration, op: &str, call: F) -> Result<T, AgentFailure>
where
    F: Future<Output = Result<T, AgentFailure>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AgentFailure::critical(
            CriticalKind::HardTimeout,
            format!("agent {op} did not finish within {limit:?}"),
        )),
    }
}
