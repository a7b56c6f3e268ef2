//! Typed domain events delivered to session subscribers.

use crate::models::permission::PermissionRequest;
use crate::models::state::SessionState;
use crate::models::tool_call::ToolCallUpdate;
use crate::models::usage::UsageTotals;

/// Events emitted by the session into the subscriber channel.
///
/// Events are delivered in the exact order the reader decoded the
/// originating frames; `seq` is a per-session monotonic counter subscribers
/// can use to detect gaps after a lagged receive.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Assistant emitted a span of text.
    TextOutput {
        /// Monotonic per-session sequence number.
        seq: u64,
        /// Text content.
        text: String,
        /// Model that produced the text, if reported.
        model: Option<String>,
    },
    /// A tool invocation was reported or updated.
    ToolUse {
        /// Monotonic per-session sequence number.
        seq: u64,
        /// The reported invocation.
        tool_call: ToolCallUpdate,
        /// Whether a permission prompt for this call is still pending.
        permission_pending: bool,
    },
    /// The agent is waiting on a human permission decision.
    PermissionNeeded {
        /// Monotonic per-session sequence number.
        seq: u64,
        /// The decoded permission ask.
        request: PermissionRequest,
    },
    /// Session usage totals changed.
    UsageChanged {
        /// Monotonic per-session sequence number.
        seq: u64,
        /// Snapshot of the running totals.
        totals: UsageTotals,
    },
    /// Session lifecycle state changed.
    LifecycleChanged {
        /// Monotonic per-session sequence number.
        seq: u64,
        /// New state.
        state: SessionState,
        /// Human-readable reason, populated for terminal transitions.
        reason: Option<String>,
    },
    /// The agent reported an error, or a frame failed to decode.
    Error {
        /// Monotonic per-session sequence number.
        seq: u64,
        /// Error description.
        message: String,
    },
    /// A frame or lifecycle marker the layer does not recognise,
    /// preserved verbatim for display rather than dropped.
    Unrecognized {
        /// Monotonic per-session sequence number.
        seq: u64,
        /// Raw line or marker content.
        raw: String,
    },
}

impl SessionEvent {
    /// Sequence number of this event.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::TextOutput { seq, .. }
            | Self::ToolUse { seq, .. }
            | Self::PermissionNeeded { seq, .. }
            | Self::UsageChanged { seq, .. }
            | Self::LifecycleChanged { seq, .. }
            | Self::Error { seq, .. }
            | Self::Unrecognized { seq, .. } => *seq,
        }
    }
}
