//! Integration tests for turn cancellation.
//!
//! Covers:
//! - an acknowledged interrupt completes `cancel_turn` and later tool
//!   frames for the turn are dropped
//! - an unacknowledged interrupt expires into a timeout error
//! - cancellation rejects outstanding permission prompts first
//! - cancellation is idempotent, including on sessions that never ran
//! - the next message opens a new turn and tool frames flow again

use std::time::Duration;

use agent_conduit::models::{SessionEvent, SessionState};
use agent_conduit::session::Session;
use agent_conduit::AppError;

use super::test_helpers::{recv_event_matching, stub_config, READY_LINE};

/// Script: after the first user message, wait for the interrupt request,
/// acknowledge it, then emit a tool frame that belongs to the cancelled
/// turn. After the next user message, emit a fresh tool frame.
fn acknowledging_script() -> String {
    format!(
        r#"echo '{READY_LINE}'
read msg
read intr
echo '{{"type":"control_response","request_id":"req_1","response":{{"status":"interrupted"}}}}'
echo '{{"type":"tool_call_update","tool_call":{{"id":"tc_stale","kind":"execute","input":{{}}}}}}'
read msg2
echo '{{"type":"tool_call_update","tool_call":{{"id":"tc_fresh","kind":"read","input":{{}}}}}}'
while read line; do
  case "$line" in
    *'"type":"terminate"'*) exit 0 ;;
  esac
done"#
    )
}

// ── Acknowledged cancellation ────────────────────────────────────────────────

/// An acknowledged interrupt completes the cancel; tool frames emitted for
/// the cancelled turn are dropped, and the next message reopens the flow.
#[tokio::test]
async fn acknowledged_cancel_drops_stale_tool_frames() {
    let session = Session::new(stub_config(&acknowledging_script()));
    let mut events = session.subscribe();
    session.start().await.expect("start");
    session.send_message("long running work").await.expect("send");

    session.cancel_turn().await.expect("cancel must be acknowledged");

    // Let the reader consume the stale frame before the next turn opens.
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.send_message("next task").await.expect("send again");

    let event =
        recv_event_matching(&mut events, |e| matches!(e, SessionEvent::ToolUse { .. })).await;
    let SessionEvent::ToolUse { tool_call, .. } = event else {
        unreachable!();
    };
    assert_eq!(
        tool_call.id, "tc_fresh",
        "the cancelled turn's tool frame must never surface"
    );

    session.terminate().await.expect("terminate");
    session.wait_terminal().await;
}

/// Cancelling twice is a no-op the second time.
#[tokio::test]
async fn second_cancel_is_a_noop() {
    let session = Session::new(stub_config(&acknowledging_script()));
    session.start().await.expect("start");
    session.send_message("work").await.expect("send");

    session.cancel_turn().await.expect("first cancel");
    session.cancel_turn().await.expect("second cancel is a no-op");

    session.terminate().await.expect("terminate");
    session.wait_terminal().await;
}

/// Cancelling with no session running is a no-op, not an error.
#[tokio::test]
async fn cancel_without_running_session_is_a_noop() {
    let session = Session::new(stub_config(&acknowledging_script()));

    session.cancel_turn().await.expect("cancel while Idle");
    assert_eq!(session.state(), SessionState::Idle);
}

// ── Unacknowledged cancellation ──────────────────────────────────────────────

/// A process that never acknowledges the interrupt causes `cancel_turn` to
/// fail with a timeout once the deadline passes.
#[tokio::test]
async fn unacknowledged_cancel_times_out() {
    // Reads the interrupt and ignores it.
    let script = format!("echo '{READY_LINE}'\nwhile read line; do :; done");
    let session = Session::new(stub_config(&script));
    session.start().await.expect("start");
    session.send_message("work").await.expect("send");

    let err = session
        .cancel_turn()
        .await
        .expect_err("no acknowledgement is coming");
    assert!(matches!(err, AppError::Timeout(_)), "got {err:?}");

    session.terminate().await.expect("terminate");
    session.wait_terminal().await;
}

// ── Interaction with permission prompts ──────────────────────────────────────

/// Cancellation first answers every outstanding permission prompt with a
/// rejection, then interrupts; afterwards nothing is pending.
#[tokio::test]
async fn cancel_rejects_outstanding_permission_prompts() {
    // Raises a permission ask, then expects the denial followed by the
    // interrupt, which it acknowledges.
    let script = format!(
        r#"echo '{READY_LINE}'
read msg
echo '{{"type":"control_request","request_id":"perm_1","request":{{"subtype":"permission","tool_call":{{"id":"tc_1","kind":"write","input":{{}}}},"options":[{{"id":"opt_a","name":"Allow","kind":"allow_once"}}]}}}}'
read denial
read intr
echo '{{"type":"control_response","request_id":"req_1","response":{{"status":"interrupted"}}}}'
while read line; do
  case "$line" in
    *'"type":"terminate"'*) exit 0 ;;
  esac
done"#
    );
    let session = Session::new(stub_config(&script));
    let mut events = session.subscribe();
    session.start().await.expect("start");
    session.send_message("work").await.expect("send");

    recv_event_matching(&mut events, |e| {
        matches!(e, SessionEvent::PermissionNeeded { .. })
    })
    .await;
    assert_eq!(session.pending_permission_count().await, 1);

    session.cancel_turn().await.expect("cancel");

    assert_eq!(
        session.pending_permission_count().await,
        0,
        "cancellation must reject every outstanding prompt"
    );

    session.terminate().await.expect("terminate");
    session.wait_terminal().await;
}

/// A permission ask that arrives after the turn was cancelled is answered
/// with an immediate rejection instead of being surfaced.
#[tokio::test]
async fn late_permission_ask_is_rejected_after_cancel() {
    // Acknowledges the interrupt, then raises a stale permission ask.
    let script = format!(
        r#"echo '{READY_LINE}'
read msg
read intr
echo '{{"type":"control_response","request_id":"req_1","response":{{"status":"interrupted"}}}}'
echo '{{"type":"control_request","request_id":"perm_9","request":{{"subtype":"permission","tool_call":{{"id":"tc_9","kind":"write","input":{{}}}},"options":[]}}}}'
while read line; do
  case "$line" in
    *'"type":"terminate"'*) exit 0 ;;
  esac
done"#
    );
    let session = Session::new(stub_config(&script));
    session.start().await.expect("start");
    session.send_message("work").await.expect("send");

    session.cancel_turn().await.expect("cancel");

    // Give the reader a moment to process the stale ask.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        session.pending_permission_count().await,
        0,
        "stale permission asks must be auto-rejected, not surfaced"
    );

    session.terminate().await.expect("terminate");
    session.wait_terminal().await;
}
