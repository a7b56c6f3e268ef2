//! Session lifecycle state and transition rules.

use serde::{Deserialize, Serialize};

/// Lifecycle state for one agent session.
///
/// `Running` keeps an orthogonal "has outstanding permission prompts" flag in
/// the session itself rather than a separate state, because normal traffic
/// continues while prompts are pending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed; the agent process has not been started.
    Idle,
    /// Spawn issued; waiting for the process ready signal.
    Starting,
    /// Bidirectional traffic flowing.
    Running,
    /// Termination requested; awaiting process exit.
    Terminating,
    /// Process exited after an explicit termination request.
    Terminated,
    /// Process exited unexpectedly or a stream closed without a
    /// termination request.
    Crashed,
}

impl SessionState {
    /// Whether this state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Crashed)
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Any non-terminal state may transition to `Terminating` or directly to
    /// `Crashed` (streams can close at any moment).
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Starting)
                | (Self::Starting, Self::Running)
                | (
                    Self::Idle | Self::Starting | Self::Running,
                    Self::Terminating | Self::Crashed
                )
                | (Self::Terminating, Self::Terminated | Self::Crashed)
        )
    }
}
