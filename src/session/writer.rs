//! Outbound writer task.
//!
//! Receives outbound JSON frames from a tokio [`mpsc`] channel, serialises
//! each value to a single-line JSON string, and writes the NDJSON line to the
//! agent's `stdin` through a [`FramedWrite`] backed by [`LineCodec`].

use futures_util::SinkExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::wire::LineCodec;
use crate::{AppError, Result};

/// Writer task — serialises outbound JSON frames and writes to `stdin`.
///
/// Receives [`serde_json::Value`] objects from `msg_rx`, serialises each to a
/// compact single-line JSON string, and sends it through the framed sink,
/// which appends the `\n` delimiter.
///
/// The task exits cleanly when:
/// - `cancel` is triggered (graceful shutdown), or
/// - `msg_rx` is closed (all senders dropped).
///
/// # Errors
///
/// - [`AppError::Wire`]`("failed to serialise outbound frame: …")` if
///   [`serde_json::to_string`] fails (should not occur for `Value`).
/// - [`AppError::Wire`]`("write failed: …")` if the write to `stdin` fails
///   (e.g. the agent process has exited).
pub async fn run_writer(
    session_id: String,
    stdin: ChildStdin,
    mut msg_rx: mpsc::Receiver<serde_json::Value>,
    max_line_bytes: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sink = FramedWrite::new(stdin, LineCodec::with_max_length(max_line_bytes));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                match msg {
                    None => {
                        debug!(session_id, "writer: message channel closed, stopping");
                        break;
                    }
                    Some(value) => {
                        let line = serde_json::to_string(&value).map_err(|e| {
                            AppError::Wire(format!(
                                "failed to serialise outbound frame: {e}"
                            ))
                        })?;

                        sink.send(line).await.map_err(|e| {
                            warn!(session_id, error = %e, "writer: write to stdin failed");
                            AppError::Wire(format!("write failed: {e}"))
                        })?;
                    }
                }
            }
        }
    }

    Ok(())
}
