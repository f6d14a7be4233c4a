use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// The deadline passed before the probe produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("condition not met within {waited:?}")]
pub struct PollTimeout {
    pub waited: Duration,
}

/// Await `probe` every `interval` until it yields `Some`, giving up after
/// `timeout`.
///
/// The probe always runs at least once, even with a zero timeout. A probe
/// that is itself slow counts against the same deadline.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    let deadline = started + timeout;

    loop {
        match tokio::time::timeout_at(deadline, probe()).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(_) => break,
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }

    Err(PollTimeout {
        waited: started.elapsed(),
    })
}
