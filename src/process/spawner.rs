//! Agent process spawner.
//!
//! Spawns headless agent processes with:
//! - `kill_on_drop(true)` so processes are cleaned up automatically.
//! - `env_clear()` + a safe variable allowlist so host credentials never leak
//!   into the child's environment.
//! - A configurable startup watchdog: if the agent does not emit its ready
//!   signal (first stdout line) within the window, the process is killed and
//!   `AppError::Spawn("startup timeout")` is returned.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned agent process.
///
/// Every other variable from the host environment is stripped via
/// `env_clear()` before the child is launched. API keys, tokens, and other
/// host secrets are therefore never visible to the agent process unless the
/// configuration's `env_passthrough` names them explicitly.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for spawning an agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent CLI binary (e.g., `claude`, `gh`, `python`).
    pub agent_binary: String,
    /// Default arguments passed to the agent binary.
    pub agent_args: Vec<String>,
    /// Workspace root directory; the child process starts in this directory.
    pub workspace_root: PathBuf,
    /// Maximum time to wait for the agent's ready signal (first stdout line).
    ///
    /// If no line is received within this window the spawner kills the
    /// process and returns `AppError::Spawn("startup timeout …")`.
    pub startup_timeout: Duration,
    /// Extra environment variables passed through beyond the allowlist.
    pub env_passthrough: Vec<String>,
}

// ── Connection handle ────────────────────────────────────────────────────────

/// Active stdio connection to a spawned agent process.
///
/// The caller is responsible for:
/// - Keeping `child` alive (it has `kill_on_drop(true)`).
/// - Forwarding messages through `stdin`.
/// - Reading stream messages from `stdout` and draining `stderr`.
#[derive(Debug)]
pub struct AgentConnection {
    /// Session identifier that the process was launched for.
    pub session_id: String,
    /// Child process handle — kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Agent's stdin for sending JSON messages to the agent.
    pub stdin: ChildStdin,
    /// Buffered reader over the agent's stdout for line-by-line NDJSON parsing.
    pub stdout: BufReader<ChildStdout>,
    /// Agent's stderr, drained for diagnostics only — never parsed as protocol.
    pub stderr: ChildStderr,
    /// The ready-signal line the agent emitted at startup.
    pub ready_line: String,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn an agent process and wait for its ready signal.
///
/// The spawner:
/// 1. Builds a `tokio::process::Command` with `env_clear()` and only the
///    variables listed in [`ALLOWED_ENV_VARS`] plus `config.env_passthrough`.
/// 2. Passes `CONDUIT_SESSION_ID` as an explicit environment variable.
/// 3. Waits up to `config.startup_timeout` for the first line of stdout
///    (the agent's ready signal).
/// 4. On timeout: kills the process and returns `AppError::Spawn`.
///
/// The ready line is retained on the returned connection; the session parses
/// it as the first protocol frame so no traffic is lost.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn agent: …")` — OS spawn failure
///   (missing executable, permission denied).
/// - `AppError::Spawn("startup timeout …")` — no ready line within the window.
/// - `AppError::Spawn("agent process exited before ready signal")` — early EOF.
pub async fn spawn_agent(config: &SpawnConfig, session_id: &str) -> Result<AgentConnection> {
    let mut cmd = Command::new(&config.agent_binary);

    for arg in &config.agent_args {
        cmd.arg(arg);
    }

    // Strip inherited environment, then inject only the safe allowlist.
    cmd.env_clear();
    for key in ALLOWED_ENV_VARS
        .iter()
        .copied()
        .chain(config.env_passthrough.iter().map(String::as_str))
    {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.env("CONDUIT_SESSION_ID", session_id);

    cmd.current_dir(&config.workspace_root)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn agent: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdin".into()))?;
    let stdout_raw = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stderr".into()))?;

    let mut reader = BufReader::new(stdout_raw);
    let mut line = String::new();

    match tokio::time::timeout(config.startup_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => {
            info!(
                session_id,
                ready_line = line.trim(),
                "agent emitted ready signal"
            );
        }
        Ok(Ok(_)) => {
            // n == 0 means EOF — process exited before sending anything.
            return Err(AppError::Spawn(
                "agent process exited before ready signal".into(),
            ));
        }
        Ok(Err(err)) => {
            return Err(AppError::Spawn(format!(
                "failed to read agent ready signal: {err}"
            )));
        }
        Err(_elapsed) => {
            // Kill the process before returning the error.
            child.kill().await.ok();
            return Err(AppError::Spawn(format!(
                "startup timeout: agent did not emit ready signal within {:?}",
                config.startup_timeout
            )));
        }
    }

    Ok(AgentConnection {
        session_id: session_id.to_owned(),
        child,
        stdin,
        stdout: reader,
        stderr,
        ready_line: line.trim_end().to_owned(),
    })
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// How the agent process actually exited.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    /// Exit code, absent when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Human-readable description of the exit.
    pub reason: String,
}

/// Spawn a background task that owns the child, awaits its exit, and reports
/// the outcome through `exit_tx`.
///
/// Two tokens steer the task:
/// - `kill`: when fired, the task escalates — on unix a `SIGTERM` first, then
///   a hard kill once `grace` elapses without exit. The eventual exit is
///   still reported through `exit_tx`.
/// - `cancel`: the task detaches without reporting (the caller is responsible
///   for orderly shutdown); `kill_on_drop` reaps the child.
///
/// # Returns
///
/// A [`JoinHandle`] for the monitoring task.  Dropping the handle detaches
/// the task; it continues running until the child exits or a token fires.
#[must_use]
pub fn monitor_exit(
    session_id: String,
    mut child: Child,
    grace: Duration,
    exit_tx: mpsc::Sender<ProcessExit>,
    kill: CancellationToken,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let exit = tokio::select! {
            result = child.wait() => exit_from_wait(&session_id, result),
            () = kill.cancelled() => {
                terminate_child(&session_id, &mut child, grace).await
            }
            () = cancel.cancelled() => {
                info!(session_id, "monitor_exit: cancellation received, exiting monitor");
                return;
            }
        };

        if exit_tx.send(exit).await.is_err() {
            warn!(
                session_id,
                "exit_tx closed before process exit could be delivered"
            );
        }
    })
}

/// Escalating termination: `SIGTERM` (unix), grace wait, then hard kill.
async fn terminate_child(session_id: &str, child: &mut Child, grace: Duration) -> ProcessExit {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok()) {
        use nix::sys::signal::{kill as send_signal, Signal};
        use nix::unistd::Pid;

        if let Err(err) = send_signal(Pid::from_raw(pid), Signal::SIGTERM) {
            warn!(session_id, %err, "monitor_exit: SIGTERM delivery failed");
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(result) => exit_from_wait(session_id, result),
        Err(_elapsed) => {
            warn!(
                session_id,
                "monitor_exit: grace window expired, force killing agent"
            );
            if let Err(err) = child.kill().await {
                warn!(session_id, %err, "monitor_exit: force kill failed");
            }
            let result = child.wait().await;
            exit_from_wait(session_id, result)
        }
    }
}

/// Translate a `child.wait()` outcome into a [`ProcessExit`].
fn exit_from_wait(
    session_id: &str,
    result: std::io::Result<std::process::ExitStatus>,
) -> ProcessExit {
    match result {
        Ok(status) => {
            let code = status.code();
            let reason = code.map_or_else(
                || "process terminated by signal".to_owned(),
                |c| format!("process exited with code {c}"),
            );
            ProcessExit {
                exit_code: code,
                reason,
            }
        }
        Err(err) => {
            warn!(session_id, %err, "error waiting for agent child process");
            ProcessExit {
                exit_code: None,
                reason: format!("wait error: {err}"),
            }
        }
    }
}
