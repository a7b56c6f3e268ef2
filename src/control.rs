//! Control channel — correlation of outbound requests with later replies.
//!
//! Outbound control requests (currently the turn-interrupt request) are
//! assigned a fresh `req_<n>` correlation id, registered as a pending waiter,
//! and written to the agent stream. When a `control_response` frame arrives
//! whose `request_id` matches a pending entry, that one waiter is resolved
//! exactly once; unmatched ids are logged and dropped. Session termination
//! drains every outstanding waiter so none is left pending forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Terminal outcome delivered to a pending waiter.
type PendingOutcome = std::result::Result<Value, PendingFailure>;

/// Failure modes for a pending request, mapped to [`AppError`] at the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingFailure {
    Cancelled,
    SessionTerminated,
}

/// Thread-safe map of pending waiters keyed by correlation id.
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<PendingOutcome>>>>;

/// Correlates outbound control requests with their eventual replies.
///
/// Cheaply cloneable; all clones share the pending map and id counter. Many
/// requests may be outstanding concurrently — the channel never serialises
/// them, and id assignment is race-free via an atomic counter.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    session_id: String,
    next_id: Arc<AtomicU64>,
    pending: PendingMap,
    writer_tx: mpsc::Sender<Value>,
}

impl ControlChannel {
    /// Create a channel writing outbound frames through `writer_tx`.
    #[must_use]
    pub fn new(session_id: String, writer_tx: mpsc::Sender<Value>) -> Self {
        Self {
            session_id,
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            writer_tx,
        }
    }

    /// Allocate a fresh correlation id. Distinct even under concurrent calls.
    #[must_use]
    pub fn allocate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("req_{n}")
    }

    /// Send `frame` as a correlated request under `request_id` and suspend
    /// until the matching reply arrives or the session reaches a terminal
    /// state. The caller allocates `request_id` via [`allocate_id`] so the
    /// id is known before the reply comes back (the session must recognise
    /// an interrupt's acknowledgement while the request is still in flight).
    ///
    /// `deadline` bounds the wait when supplied; permission deliberation has
    /// no protocol-level deadline, so only internally generated requests
    /// (interrupt acks) pass one.
    ///
    /// # Errors
    ///
    /// - [`AppError::SessionTerminated`] — the session ended first.
    /// - [`AppError::Cancelled`] — the waiter was explicitly cancelled.
    /// - [`AppError::Timeout`] — `deadline` elapsed without a reply.
    /// - [`AppError::Wire`] — the writer channel is closed.
    ///
    /// [`allocate_id`]: ControlChannel::allocate_id
    pub async fn request_with_id(
        &self,
        request_id: &str,
        frame: Value,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(request_id.to_owned(), tx);

        if self.writer_tx.send(frame).await.is_err() {
            // Writer gone — remove the waiter we just registered.
            self.pending.lock().await.remove(request_id);
            return Err(AppError::Wire(format!(
                "write failed: stream closed for session '{}'",
                self.session_id
            )));
        }

        let outcome = match deadline {
            Some(window) => match tokio::time::timeout(window, rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    self.pending.lock().await.remove(request_id);
                    return Err(AppError::Timeout(format!(
                        "no reply for '{request_id}' within {window:?}"
                    )));
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(PendingFailure::Cancelled)) => Err(AppError::Cancelled(format!(
                "request '{request_id}' cancelled"
            ))),
            Ok(Err(PendingFailure::SessionTerminated)) | Err(_) => Err(
                AppError::SessionTerminated(format!("request '{request_id}' never answered")),
            ),
        }
    }

    /// Resolve the pending waiter for `request_id` with the reply payload.
    ///
    /// First resolution wins; a reply for an id with no pending entry is a
    /// correlation mismatch — logged and dropped, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Correlation`] for unmatched ids so the caller can
    /// count mismatches; the session treats this as non-fatal.
    pub async fn resolve(&self, request_id: &str, response: Value) -> Result<()> {
        let waiter = self.pending.lock().await.remove(request_id);

        let Some(tx) = waiter else {
            warn!(
                session_id = self.session_id.as_str(),
                request_id, "control: reply for unknown correlation id, dropping"
            );
            return Err(AppError::Correlation(format!(
                "no pending request for id '{request_id}'"
            )));
        };

        // The receiver may already be gone (caller timed out); that is fine.
        if tx.send(Ok(response)).is_err() {
            debug!(
                session_id = self.session_id.as_str(),
                request_id, "control: waiter dropped before reply delivery"
            );
        }
        Ok(())
    }

    /// Cancel one pending waiter. Idempotent — an unknown id is a no-op.
    pub async fn cancel(&self, request_id: &str) {
        if let Some(tx) = self.pending.lock().await.remove(request_id) {
            tx.send(Err(PendingFailure::Cancelled)).ok();
            debug!(
                session_id = self.session_id.as_str(),
                request_id, "control: pending request cancelled"
            );
        }
    }

    /// Drain every outstanding waiter with `SessionTerminated`.
    ///
    /// Called exactly once as part of the terminal state transition; no
    /// waiter may remain pending afterwards.
    pub async fn fail_all_terminated(&self) {
        let drained: Vec<(String, oneshot::Sender<PendingOutcome>)> =
            self.pending.lock().await.drain().collect();

        let count = drained.len();
        for (request_id, tx) in drained {
            debug!(
                session_id = self.session_id.as_str(),
                request_id = request_id.as_str(),
                "control: failing pending request on termination"
            );
            tx.send(Err(PendingFailure::SessionTerminated)).ok();
        }

        if count > 0 {
            warn!(
                session_id = self.session_id.as_str(),
                count, "control: drained pending requests on session termination"
            );
        }
    }

    /// Number of requests currently awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
