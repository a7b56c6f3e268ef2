//! Integration tests for process failure paths.
//!
//! Covers:
//! - spawn failures surface immediately and end the session
//! - the startup watchdog kills agents that never become ready
//! - unexpected exit finalises to `Crashed` and drains everything pending
//! - recent stderr lines are retained for diagnostics

use std::time::Duration;

use agent_conduit::models::{SessionEvent, SessionState};
use agent_conduit::session::Session;
use agent_conduit::AppError;

use super::test_helpers::{recv_event_matching, stub_config, READY_LINE};

// ── Spawn failures ───────────────────────────────────────────────────────────

/// A missing executable fails `start()` immediately; the session ends
/// `Crashed` with no process to clean up.
#[tokio::test]
async fn missing_executable_fails_start() {
    let mut config = stub_config("true");
    config.agent_binary = "/nonexistent/agent-binary".to_owned();
    let session = Session::new(config);

    let err = session.start().await.expect_err("spawn must fail");

    assert!(matches!(err, AppError::Spawn(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Crashed);
}

/// An agent that never emits its ready signal is killed by the startup
/// watchdog.
#[tokio::test]
async fn silent_agent_trips_startup_watchdog() {
    let mut config = stub_config("sleep 30");
    config.startup_timeout_seconds = 1;
    let session = Session::new(config);

    let err = session.start().await.expect_err("watchdog must fire");

    assert!(
        matches!(err, AppError::Spawn(ref msg) if msg.contains("startup timeout")),
        "got {err:?}"
    );
    assert_eq!(session.state(), SessionState::Crashed);
}

/// An agent that exits before emitting anything fails `start()` with an
/// early-EOF spawn error.
#[tokio::test]
async fn early_exit_before_ready_fails_start() {
    let session = Session::new(stub_config("exit 7"));

    let err = session.start().await.expect_err("early exit must fail start");

    assert!(
        matches!(err, AppError::Spawn(ref msg) if msg.contains("before ready signal")),
        "got {err:?}"
    );
}

// ── Unexpected exit ──────────────────────────────────────────────────────────

/// A process that dies mid-session finalises to `Crashed` with a lifecycle
/// event carrying the exit reason.
#[tokio::test]
async fn unexpected_exit_finalises_to_crashed() {
    let script = format!("echo '{READY_LINE}'\nread msg\nexit 3");
    let session = Session::new(stub_config(&script));
    let mut events = session.subscribe();
    session.start().await.expect("start");
    session.send_message("trigger the exit").await.expect("send");

    let event = recv_event_matching(&mut events, |e| {
        matches!(
            e,
            SessionEvent::LifecycleChanged {
                state: SessionState::Crashed,
                ..
            }
        )
    })
    .await;

    let SessionEvent::LifecycleChanged { reason, .. } = event else {
        unreachable!();
    };
    assert!(
        reason.is_some(),
        "the terminal lifecycle event must carry a reason"
    );
    assert_eq!(session.wait_terminal().await, SessionState::Crashed);
}

/// A crash with a permission prompt outstanding drains the prompt; nothing
/// stays pending forever.
#[tokio::test]
async fn crash_drains_outstanding_permission_prompts() {
    let script = format!(
        r#"echo '{READY_LINE}'
read msg
echo '{{"type":"control_request","request_id":"perm_1","request":{{"subtype":"permission","tool_call":{{"id":"tc_1","kind":"execute","input":{{}}}},"options":[{{"id":"opt_a","name":"Allow","kind":"allow_once"}}]}}}}'
sleep 0.2
exit 5"#
    );
    let session = Session::new(stub_config(&script));
    let mut events = session.subscribe();
    session.start().await.expect("start");
    session.send_message("dangerous work").await.expect("send");

    recv_event_matching(&mut events, |e| {
        matches!(e, SessionEvent::PermissionNeeded { .. })
    })
    .await;

    assert_eq!(session.wait_terminal().await, SessionState::Crashed);
    assert_eq!(
        session.pending_permission_count().await,
        0,
        "the crash must drain every outstanding prompt"
    );

    // Commands on the dead session fail cleanly.
    let err = session
        .send_message("anyone there?")
        .await
        .expect_err("crashed session must reject messages");
    assert!(matches!(err, AppError::SessionTerminated(_)), "got {err:?}");
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// Stderr output is never parsed as protocol but is retained for
/// diagnostics after a crash.
#[tokio::test]
async fn stderr_lines_are_retained_for_diagnostics() {
    let script = format!(
        "echo '{READY_LINE}'\necho 'panic: lost the plot' >&2\nsleep 0.3\nexit 1"
    );
    let session = Session::new(stub_config(&script));
    session.start().await.expect("start");

    assert_eq!(session.wait_terminal().await, SessionState::Crashed);

    // The drain races process exit by a hair; give it a beat.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = session.stderr_snapshot().await;
    assert!(
        snapshot.iter().any(|l| l.contains("lost the plot")),
        "stderr diagnostics must be captured, got {snapshot:?}"
    );
}
