//! Child-process backend.
//!
//! Wraps a [`Session`] behind the [`AgentBackend`] trait. This is the only
//! production transport: the agent runs as a child process and speaks
//! newline-delimited JSON over stdin/stdout.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;

use crate::backend::AgentBackend;
use crate::config::AgentConfig;
use crate::models::{PermissionDecision, SessionEvent, SessionState, UsageTotals};
use crate::session::Session;
use crate::Result;

/// [`AgentBackend`] implementation running the agent as a child process.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    session: Session,
}

impl ProcessBackend {
    /// Create a backend for one session; no process is spawned yet.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            session: Session::new(config),
        }
    }

    /// The underlying session, for callers that need its full surface
    /// (stderr snapshots, permission introspection, terminal waits).
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl AgentBackend for ProcessBackend {
    fn start(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.session.start())
    }

    fn send_message<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.session.send_message(text))
    }

    fn resolve_permission<'a>(
        &'a self,
        tool_call_id: &'a str,
        decision: PermissionDecision,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.session.resolve_permission(tool_call_id, decision))
    }

    fn cancel_turn(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.session.cancel_turn())
    }

    fn terminate(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.session.terminate())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    fn state(&self) -> SessionState {
        self.session.state()
    }

    fn usage_totals(&self) -> Pin<Box<dyn Future<Output = UsageTotals> + Send + '_>> {
        Box::pin(self.session.usage_totals())
    }
}
