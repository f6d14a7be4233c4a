use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Why the breaker declined a restart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RestartRefused {
    /// The previous restart was too recent.
    ///
    /// Refusals of this kind are temporary: once `remaining` has elapsed the
    /// next critical failure may restart again. The caller hands the original
    /// failure back untouched and the ledger is not modified.
    #[error("restart refused: cooldown active for another {remaining:?}")]
    Cooldown { remaining: Duration },

    /// Every restart this process is allowed has been spent.
    ///
    /// This is permanent for the lifetime of the breaker. The owner must
    /// treat it as fatal and stop taking work.
    #[error("restart refused: limit of {max} restarts reached")]
    LimitExceeded { restarts: u32, max: u32 },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// A restart would be admitted right now.
    Armed,
    /// Restarts remain, but the cooldown since the last one is still running.
    CoolingDown,
    /// No restarts remain.
    Tripped,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Restarts allowed for the lifetime of the breaker.
    pub max_restarts: u32,
    /// Minimum time between two admitted restarts.
    pub cooldown: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Restart bookkeeping. Counters only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartLedger {
    pub restart_count: u32,
    pub last_restart: Option<Instant>,
}

impl RestartLedger {
    pub fn since_last_restart(&self) -> Option<Duration> {
        self.last_restart.map(|at| at.elapsed())
    }
}

// ---------------------------------------------------------------------------
// RestartBreaker
// ---------------------------------------------------------------------------

/// Bounds automatic recovery of the agent session.
///
/// Unlike a request-level circuit breaker this one never closes again: the
/// failure counter is the number of restarts already performed, and once it
/// reaches `max_restarts` every further request for a restart is refused.
#[derive(Debug, Clone)]
pub struct RestartBreaker {
    policy: RestartPolicy,
    ledger: Arc<Mutex<RestartLedger>>,
}

impl RestartBreaker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            ledger: Arc::new(Mutex::new(RestartLedger::default())),
        }
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    /// Copy of the ledger for health readers.
    pub async fn ledger(&self) -> RestartLedger {
        *self.ledger.lock().await
    }

    pub async fn restart_count(&self) -> u32 {
        self.ledger.lock().await.restart_count
    }

    pub async fn state(&self) -> BreakerState {
        let guard = self.ledger.lock().await;
        self.state_of(&guard, Instant::now())
    }

    /// Ask for permission to restart.
    ///
    /// On success the restart is recorded immediately (count incremented,
    /// timestamp stamped) and the new restart count is returned, so a restart
    /// that later fails still counts against the limit. Refusals leave the
    /// ledger untouched.
    pub async fn try_admit(&self) -> Result<u32, RestartRefused> {
        let mut guard = self.ledger.lock().await;
        let now = Instant::now();

        if guard.restart_count >= self.policy.max_restarts {
            warn!(
                restarts = guard.restart_count,
                max = self.policy.max_restarts,
                "restart breaker tripped, refusing restart"
            );
            return Err(RestartRefused::LimitExceeded {
                restarts: guard.restart_count,
                max: self.policy.max_restarts,
            });
        }

        if let Some(remaining) = self.cooldown_remaining(&guard, now) {
            info!(?remaining, "restart breaker cooling down, refusing restart");
            return Err(RestartRefused::Cooldown { remaining });
        }

        guard.restart_count += 1;
        guard.last_restart = Some(now);
        info!(
            restart = guard.restart_count,
            max = self.policy.max_restarts,
            "restart admitted"
        );
        Ok(guard.restart_count)
    }

    // ----- helpers -----

    fn cooldown_remaining(&self, ledger: &RestartLedger, now: Instant) -> Option<Duration> {
        let last = ledger.last_restart?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.policy.cooldown).then(|| self.policy.cooldown - elapsed)
    }

    fn state_of(&self, ledger: &RestartLedger, now: Instant) -> BreakerState {
        if ledger.restart_count >= self.policy.max_restarts {
            BreakerState::Tripped
        } else if self.cooldown_remaining(ledger, now).is_some() {
            BreakerState::CoolingDown
        } else {
            BreakerState::Armed
        }
    }
}

impl Default for RestartBreaker {
    fn default() -> Self {
        Self::new(RestartPolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
