//! Stderr diagnostics drain.
//!
//! The agent's stderr is never parsed as protocol. This task logs each line
//! and retains the most recent lines in a bounded ring so a crash report can
//! include the agent's final diagnostics.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounded ring of the agent's most recent stderr lines.
#[derive(Debug, Clone)]
pub struct StderrRing {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl StderrRing {
    /// Create a ring retaining at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when at capacity.
    pub async fn push(&self, line: String) {
        let mut lines = self.lines.lock().await;
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of the retained lines, oldest first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.lines.lock().await.iter().cloned().collect()
    }
}

/// Stderr drain task — reads diagnostic lines until EOF or cancellation.
///
/// Each line is logged at `debug` and appended to `ring`. Read errors stop
/// the drain; they are not surfaced to the session because stderr carries no
/// protocol traffic.
pub async fn run_stderr_drain<R>(
    session_id: String,
    stderr: R,
    ring: StderrRing,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = BufReader::new(stderr).lines();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "stderr drain: cancellation received, stopping");
                break;
            }

            line = reader.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        debug!(session_id, stderr_line = line.as_str(), "agent stderr");
                        ring.push(line).await;
                    }
                    Ok(None) => {
                        debug!(session_id, "stderr drain: EOF");
                        break;
                    }
                    Err(err) => {
                        debug!(session_id, %err, "stderr drain: read error, stopping");
                        break;
                    }
                }
            }
        }
    }
}
