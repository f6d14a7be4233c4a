use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// ShutdownReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operator asked for it (ctrl-c, SIGTERM).
    Interrupted,
    /// A component hit an unrecoverable condition.
    Fatal(String),
}

impl ShutdownReason {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShutdownReason::Fatal(_))
    }
}

// ---------------------------------------------------------------------------
// ShutdownSignal: cooperative shutdown coordination
// ---------------------------------------------------------------------------

/// Watch-based shutdown coordinator.
///
/// Any clone may `trigger()`; the first reason wins and later triggers are
/// ignored. Components await `wait()` (or `select!` on it) alongside their
/// work.
///
/// ```ignore
/// let shutdown = ShutdownSignal::new();
/// let waiter = shutdown.clone();
/// axum::serve(listener, app)
///     .with_graceful_shutdown(async move { waiter.wait().await; })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Check if shutdown has been triggered (non-blocking).
    pub fn is_shutting_down(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.rx.borrow().clone()
    }

    /// Trigger shutdown. Returns `false` if it had already been triggered.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut first = false;
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            match &reason {
                ShutdownReason::Interrupted => info!("shutdown signal triggered"),
                ShutdownReason::Fatal(why) => error!(reason = %why, "fatal shutdown triggered"),
            }
            *current = Some(reason.clone());
            first = true;
            true
        });
        if !first {
            warn!("shutdown already triggered");
        }
        first
    }

    /// Resolve once shutdown has been triggered, yielding the reason.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Every sender is gone; nobody can trigger any more.
                return ShutdownReason::Interrupted;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
