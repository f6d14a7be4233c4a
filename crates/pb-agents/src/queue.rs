//! FIFO admission of prompts in front of the single-session agent.
//!
//! [`RequestQueue::enqueue`] never waits for the agent. It validates the
//! prompt, appends it, lazily starts the consumer and hands back a
//! [`RequestHandle`] that resolves exactly once. A single consumer task drains
//! the queue in arrival order, runs each prompt to completion through the
//! [`PromptExecutor`] and keeps consecutive requests at least the configured
//! pause apart. The pause is served before the next request starts, so an
//! idle queue reports itself as idle straight away.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pb_core::error::BridgeError;
use pb_core::types::{FailureKind, Request, RequestFailure};

const PREVIEW_CHARS: usize = 50;

/// Whatever turns a prompt into an answer. The orchestrator in production.
#[async_trait]
pub trait PromptExecutor: Send + Sync + 'static {
    async fn execute(&self, prompt: &str) -> Result<String, BridgeError>;
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Minimum gap between one request finishing and the next one starting.
    pub inter_request_pause: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            inter_request_pause: Duration::from_secs(1),
        }
    }
}

/// Snapshot of the request the consumer is running right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlight {
    pub id: Uuid,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

type Completion = Result<String, RequestFailure>;

struct Pending {
    request: Request,
    completion: oneshot::Sender<Completion>,
}

// ---------------------------------------------------------------------------
// RequestHandle
// ---------------------------------------------------------------------------

/// Resolves once with the answer or the failure of one request.
///
/// Dropping the handle does not cancel a request that already started; the
/// consumer runs it to completion and discards the result.
#[derive(Debug)]
pub struct RequestHandle {
    id: Uuid,
    rx: oneshot::Receiver<Completion>,
}

impl RequestHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for RequestHandle {
    type Output = Completion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(RequestFailure::new(
                    FailureKind::Internal,
                    "request dropped before completion",
                ))
            })
        })
    }
}

// ---------------------------------------------------------------------------
// RequestQueue
// ---------------------------------------------------------------------------

struct Shared {
    tx: flume::Sender<Pending>,
    rx: flume::Receiver<Pending>,
    processing: AtomicBool,
    in_flight: Mutex<Option<InFlight>>,
    halt: watch::Sender<Option<String>>,
    executor: Arc<dyn PromptExecutor>,
    pause: Duration,
    /// Earliest instant the next request may reach the executor.
    next_start: Mutex<Option<Instant>>,
}

/// Cheap to clone; every clone feeds the same consumer.
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<Shared>,
}

impl RequestQueue {
    pub fn new(executor: Arc<dyn PromptExecutor>, options: QueueOptions) -> Self {
        let (tx, rx) = flume::unbounded();
        let (halt, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                tx,
                rx,
                processing: AtomicBool::new(false),
                in_flight: Mutex::new(None),
                halt,
                executor,
                pause: options.inter_request_pause,
                next_start: Mutex::new(None),
            }),
        }
    }

    /// Admit a prompt and return its completion handle without waiting.
    ///
    /// Must be called from within a Tokio runtime: the first enqueue after
    /// the queue went idle spawns the consumer task.
    pub fn enqueue(&self, prompt: impl Into<String>) -> Result<RequestHandle, BridgeError> {
        let request = Request::new(prompt)?;
        if let Some(reason) = self.halt_reason() {
            return Err(BridgeError::QueueClosed(reason));
        }

        let (completion, rx) = oneshot::channel();
        let id = request.id;
        info!(
            request_id = %id,
            preview = %request.preview(PREVIEW_CHARS),
            queue_size = self.size() + 1,
            "request enqueued"
        );
        self.shared
            .tx
            .send(Pending { request, completion })
            .map_err(|_| BridgeError::Internal("queue channel disconnected".into()))?;

        self.ensure_consumer();
        Ok(RequestHandle { id, rx })
    }

    /// Enqueue and wait for the answer.
    pub async fn ask(&self, prompt: impl Into<String>) -> Completion {
        self.enqueue(prompt).map_err(RequestFailure::from)?.await
    }

    /// Requests waiting to start. The one in flight is not counted.
    pub fn size(&self) -> usize {
        self.shared.rx.len()
    }

    /// Whether a consumer task is currently running.
    pub fn is_processing(&self) -> bool {
        self.shared.processing.load(Ordering::Acquire)
    }

    pub fn current(&self) -> Option<InFlight> {
        self.shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Why the queue stopped admitting work, if it has.
    pub fn halt_reason(&self) -> Option<String> {
        self.shared.halt.borrow().clone()
    }

    pub fn is_halted(&self) -> bool {
        self.shared.halt.borrow().is_some()
    }

    /// Observe the transition to halted. The value is `Some(reason)` once a
    /// fatal failure stopped the queue.
    pub fn subscribe_halt(&self) -> watch::Receiver<Option<String>> {
        self.shared.halt.subscribe()
    }

    fn ensure_consumer(&self) {
        if self
            .shared
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move { shared.run().await });
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>) {
        debug!("queue consumer started");
        loop {
            while let Ok(pending) = self.rx.try_recv() {
                self.process(pending).await;
            }
            self.processing.store(false, Ordering::Release);

            // An enqueue between the last try_recv and the store above saw
            // the flag still set and did not spawn; pick its request up here.
            if self.rx.is_empty()
                || self
                    .processing
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                break;
            }
        }
        debug!("queue consumer idle");
    }

    async fn process(&self, pending: Pending) {
        let Pending {
            request,
            completion,
        } = pending;

        if let Some(reason) = self.halt.borrow().clone() {
            let _ = completion.send(Err(RequestFailure::from(BridgeError::QueueClosed(reason))));
            return;
        }
        if completion.is_closed() {
            info!(request_id = %request.id, "caller gone before start, skipping request");
            return;
        }

        let preview = request.preview(PREVIEW_CHARS);
        self.set_in_flight(Some(InFlight {
            id: request.id,
            preview: preview.clone(),
            created_at: request.created_at,
            started_at: Utc::now(),
        }));
        let resume_at = *self.next_start.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(at) = resume_at {
            tokio::time::sleep_until(at).await;
        }
        info!(request_id = %request.id, %preview, "processing request");

        // A panicking executor must not take the consumer down with it.
        let executor = Arc::clone(&self.executor);
        let prompt = request.prompt;
        let outcome = match tokio::spawn(async move { executor.execute(&prompt).await }).await {
            Ok(outcome) => outcome,
            Err(join) => Err(BridgeError::Internal(format!("executor task failed: {join}"))),
        };

        let resolved = match outcome {
            Ok(answer) => {
                info!(request_id = %request.id, answer_len = answer.len(), "request completed");
                Ok(answer)
            }
            Err(err) if err.is_fatal() => {
                error!(request_id = %request.id, error = %err, "fatal failure, halting queue");
                self.halt.send_if_modified(|reason| {
                    if reason.is_some() {
                        return false;
                    }
                    *reason = Some(err.to_string());
                    true
                });
                Err(RequestFailure::from(err))
            }
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "request failed");
                Err(RequestFailure::from(err))
            }
        };

        if completion.send(resolved).is_err() {
            debug!(request_id = %request.id, "caller stopped waiting, result discarded");
        }
        *self.next_start.lock().unwrap_or_else(PoisonError::into_inner) =
            (!self.pause.is_zero()).then(|| Instant::now() + self.pause);
        self.set_in_flight(None);
    }

    fn set_in_flight(&self, value: Option<InFlight>) {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
