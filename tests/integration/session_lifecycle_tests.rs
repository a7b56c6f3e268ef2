//! Integration tests for the session lifecycle against stub agent
//! processes.
//!
//! Covers:
//! - start reaches `Running` and surfaces the agent-assigned session id
//! - commands outside `Running` are rejected with state errors
//! - a second start is rejected
//! - graceful termination walks `Terminating → Terminated`
//! - terminate is idempotent and valid before start

use agent_conduit::models::{SessionEvent, SessionState};
use agent_conduit::session::Session;
use agent_conduit::AppError;

use super::test_helpers::{recv_event_matching, stub_config, READY_LINE};

/// Script for a well-behaved agent: emits the ready signal, then consumes
/// stdin until it sees the terminate frame.
fn cooperative_script() -> String {
    format!(
        r#"echo '{READY_LINE}'
while read line; do
  case "$line" in
    *'"type":"terminate"'*) exit 0 ;;
  esac
done"#
    )
}

// ── Startup ──────────────────────────────────────────────────────────────────

/// Starting a session spawns the process, consumes the ready signal, and
/// reaches `Running` with the agent-assigned session id.
#[tokio::test]
async fn start_reaches_running_with_agent_session_id() {
    let session = Session::new(stub_config(&cooperative_script()));
    assert_eq!(session.state(), SessionState::Idle);

    session.start().await.expect("start must succeed");

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(
        session.session_id().await,
        "sess_stub",
        "the session_started marker must replace the provisional id"
    );

    session.terminate().await.expect("terminate");
    assert_eq!(session.wait_terminal().await, SessionState::Terminated);
}

/// A second start on the same session is a state error.
#[tokio::test]
async fn second_start_is_rejected() {
    let session = Session::new(stub_config(&cooperative_script()));
    session.start().await.expect("first start");

    let err = session.start().await.expect_err("second start must fail");
    assert!(matches!(err, AppError::State(_)), "got {err:?}");

    session.terminate().await.expect("terminate");
    session.wait_terminal().await;
}

/// Sending a message before start is a state error; the session stays
/// `Idle`.
#[tokio::test]
async fn send_message_before_start_is_rejected() {
    let session = Session::new(stub_config(&cooperative_script()));

    let err = session
        .send_message("hello")
        .await
        .expect_err("must be rejected while Idle");

    assert!(matches!(err, AppError::State(_)), "got {err:?}");
    assert_eq!(session.state(), SessionState::Idle);
}

// ── Termination ──────────────────────────────────────────────────────────────

/// Graceful termination walks `Terminating → Terminated` and emits the
/// lifecycle events in order.
#[tokio::test]
async fn terminate_walks_terminating_to_terminated() {
    let session = Session::new(stub_config(&cooperative_script()));
    let mut events = session.subscribe();
    session.start().await.expect("start");

    session.terminate().await.expect("terminate");

    recv_event_matching(&mut events, |e| {
        matches!(
            e,
            SessionEvent::LifecycleChanged {
                state: SessionState::Terminating,
                ..
            }
        )
    })
    .await;
    recv_event_matching(&mut events, |e| {
        matches!(
            e,
            SessionEvent::LifecycleChanged {
                state: SessionState::Terminated,
                ..
            }
        )
    })
    .await;

    assert_eq!(session.wait_terminal().await, SessionState::Terminated);
}

/// A process that ignores the terminate frame is killed once the grace
/// window expires; the session still ends `Terminated` because termination
/// was requested.
#[tokio::test]
async fn unresponsive_process_is_killed_after_grace_window() {
    // Ignores stdin and all polite signals.
    let script = format!("echo '{READY_LINE}'\ntrap '' TERM\nwhile true; do sleep 1; done");
    let session = Session::new(stub_config(&script));
    session.start().await.expect("start");

    session.terminate().await.expect("terminate");

    assert_eq!(
        session.wait_terminal().await,
        SessionState::Terminated,
        "requested termination must end Terminated even when force-killed"
    );
}

/// Terminate is idempotent: a second call on a terminal session is a no-op.
#[tokio::test]
async fn terminate_is_idempotent() {
    let session = Session::new(stub_config(&cooperative_script()));
    session.start().await.expect("start");

    session.terminate().await.expect("first terminate");
    session.wait_terminal().await;
    session.terminate().await.expect("second terminate is a no-op");

    assert_eq!(session.state(), SessionState::Terminated);
}

/// Terminating a session that never started ends it without a process.
#[tokio::test]
async fn terminate_before_start_ends_session() {
    let session = Session::new(stub_config(&cooperative_script()));

    session.terminate().await.expect("terminate while Idle");

    assert_eq!(session.state(), SessionState::Terminated);

    let err = session
        .send_message("too late")
        .await
        .expect_err("terminal session must reject messages");
    assert!(matches!(err, AppError::SessionTerminated(_)), "got {err:?}");
}
