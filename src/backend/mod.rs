//! Backend abstraction over agent session transports.
//!
//! The [`AgentBackend`] trait decouples consumers (the CLI, embedding
//! applications, tests) from how a session actually reaches an agent. The
//! production implementation is [`ProcessBackend`], which runs the agent as
//! a child process speaking newline-delimited JSON over its standard
//! streams; tests substitute in-memory fakes.

pub mod process;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;

use crate::models::{PermissionDecision, SessionEvent, SessionState, UsageTotals};
use crate::Result;

pub use process::ProcessBackend;

/// Uniform command surface over one agent session.
///
/// All methods are safe to call from multiple tasks concurrently; ordering
/// guarantees apply only to the event stream, never to command completion.
pub trait AgentBackend: Send + Sync {
    /// Start the session: establish the transport and reach `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::State`](crate::AppError::State) if already started.
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) if the transport
    /// could not be established.
    fn start(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Queue one user message for the agent. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::State`](crate::AppError::State) if the session is
    /// not `Running`.
    fn send_message<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Answer a pending permission prompt. First resolution wins; later
    /// calls for the same tool-call id are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if the
    /// decision names an option the prompt never offered.
    fn resolve_permission<'a>(
        &'a self,
        tool_call_id: &'a str,
        decision: PermissionDecision,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Cancel the in-flight turn. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Timeout`](crate::AppError::Timeout) if the agent
    /// does not acknowledge within the configured deadline.
    fn cancel_turn(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Request orderly termination. Idempotent; valid in any state.
    ///
    /// # Errors
    ///
    /// Implementation-specific transport failures only.
    fn terminate(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Subscribe to the ordered session event stream.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Snapshot of accumulated usage totals.
    fn usage_totals(&self) -> Pin<Box<dyn Future<Output = UsageTotals> + Send + '_>>;
}
