//! Pending-permission registry.
//!
//! Per-session map from an in-flight tool-call id to its not-yet-resolved
//! permission request. Entries are created and removed only by the session's
//! own state-transition logic so the create/resolve/discard sequence stays
//! race-free; consumers observe pending prompts through emitted events.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::models::PermissionRequest;

/// Thread-safe registry of pending permission requests keyed by tool-call id.
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    entries: Arc<Mutex<HashMap<String, PermissionRequest>>>,
}

impl PermissionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request under its tool-call id.
    ///
    /// Returns `false` without replacing when an entry for the same tool-call
    /// id is already pending — duplicate asks from the process are dropped.
    pub async fn insert(&self, request: PermissionRequest) -> bool {
        let mut entries = self.entries.lock().await;
        let tool_call_id = request.tool_call.id.clone();
        if entries.contains_key(&tool_call_id) {
            debug!(
                tool_call_id = tool_call_id.as_str(),
                "registry: duplicate permission ask dropped"
            );
            return false;
        }
        entries.insert(tool_call_id, request);
        true
    }

    /// Remove and return the pending request for `tool_call_id`.
    ///
    /// Returns `None` when no entry is pending — the basis for idempotent
    /// resolution: first caller wins, later callers see nothing to do.
    pub async fn take(&self, tool_call_id: &str) -> Option<PermissionRequest> {
        self.entries.lock().await.remove(tool_call_id)
    }

    /// Whether a prompt is pending for `tool_call_id`.
    pub async fn has_pending(&self, tool_call_id: &str) -> bool {
        self.entries.lock().await.contains_key(tool_call_id)
    }

    /// Remove and return every pending request.
    ///
    /// Used on cancellation and termination so each entry can be answered
    /// with a formal rejection before being discarded.
    pub async fn drain(&self) -> Vec<PermissionRequest> {
        self.entries
            .lock()
            .await
            .drain()
            .map(|(_, request)| request)
            .collect()
    }

    /// Number of pending prompts.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no prompts are pending.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
