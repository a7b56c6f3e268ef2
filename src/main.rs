#![forbid(unsafe_code)]

//! `agent-conduit` — run one agent session from the command line.
//!
//! Spawns the configured agent process, sends the prompt, and streams the
//! session's events until the session reaches a terminal state. Permission
//! prompts are resolved automatically according to `--permissions`; Ctrl-C
//! requests orderly termination.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_conduit::backend::{AgentBackend, ProcessBackend};
use agent_conduit::models::{
    PermissionDecision, PermissionOptionKind, PermissionRequest, SessionEvent, SessionState,
};
use agent_conduit::{AgentConfig, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Automatic decision applied to every permission prompt.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum PermissionPolicy {
    /// Choose the first allow option the prompt offers.
    Allow,
    /// Reject every prompt.
    Reject,
}

#[derive(Debug, Parser)]
#[command(name = "agent-conduit", about = "Agent process session runner", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// How to answer permission prompts.
    #[arg(long, value_enum, default_value_t = PermissionPolicy::Reject)]
    permissions: PermissionPolicy,

    /// Prompt sent once the session is running.
    prompt: String,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = AgentConfig::load_from_path(&args.config)?;
    if let Some(ws) = args.workspace {
        config.workspace_root = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
    }
    config.validate()?;
    info!("configuration loaded");

    let backend = ProcessBackend::new(config);
    let mut events = backend.subscribe();

    backend.start().await?;
    let session_id = backend.session().session_id().await;
    info!(session_id, "session running");

    backend.send_message(&args.prompt).await?;

    // ── Event loop ──────────────────────────────────────
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(%err, "ctrl-c handler failed");
                }
                info!("interrupt received, terminating session");
                if let Err(err) = backend.terminate().await {
                    error!(%err, "terminate failed");
                }
            }

            event = events.recv() => match event {
                Ok(event) => {
                    if handle_event(&backend, args.permissions, event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged, events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    // ── Wrap-up ─────────────────────────────────────────
    let totals = backend.usage_totals().await;
    info!(
        input_tokens = totals.total.input_tokens,
        output_tokens = totals.total.output_tokens,
        cost_usd = totals.total.cost_usd,
        "session finished"
    );

    if backend.state() == SessionState::Crashed {
        for line in backend.session().stderr_snapshot().await {
            eprintln!("agent stderr: {line}");
        }
        return Err(AppError::Crashed("agent process crashed".into()));
    }

    Ok(())
}

/// Print or log one event. Returns `true` once the session is terminal.
async fn handle_event(
    backend: &ProcessBackend,
    policy: PermissionPolicy,
    event: SessionEvent,
) -> bool {
    match event {
        SessionEvent::TextOutput { text, .. } => {
            println!("{text}");
        }

        SessionEvent::ToolUse {
            tool_call,
            permission_pending,
            ..
        } => {
            info!(
                tool_call_id = tool_call.id.as_str(),
                title = tool_call.title.as_deref().unwrap_or(""),
                ?permission_pending,
                "tool use"
            );
        }

        SessionEvent::PermissionNeeded { request, .. } => {
            let decision = decide(policy, &request);
            debug!(
                tool_call_id = request.tool_call.id.as_str(),
                ?decision,
                "auto-resolving permission prompt"
            );
            if let Err(err) = backend
                .resolve_permission(&request.tool_call.id, decision)
                .await
            {
                error!(%err, "permission resolution failed");
            }
        }

        SessionEvent::UsageChanged { totals, .. } => {
            debug!(
                input_tokens = totals.total.input_tokens,
                output_tokens = totals.total.output_tokens,
                "usage updated"
            );
        }

        SessionEvent::LifecycleChanged { state, reason, .. } => {
            info!(?state, reason = reason.as_deref().unwrap_or(""), "lifecycle");
            return state.is_terminal();
        }

        SessionEvent::Error { message, .. } => {
            error!(message, "agent error");
        }

        SessionEvent::Unrecognized { raw, .. } => {
            debug!(raw, "unrecognized frame");
        }
    }
    false
}

/// Map the configured policy onto the options a prompt actually offers.
fn decide(policy: PermissionPolicy, request: &PermissionRequest) -> PermissionDecision {
    let pick = |kinds: &[PermissionOptionKind]| {
        request
            .options
            .iter()
            .find(|opt| kinds.contains(&opt.kind))
            .map(|opt| PermissionDecision::Selected(opt.id.clone()))
    };

    match policy {
        PermissionPolicy::Allow => pick(&[
            PermissionOptionKind::AllowOnce,
            PermissionOptionKind::AllowAlways,
        ]),
        PermissionPolicy::Reject => pick(&[
            PermissionOptionKind::RejectOnce,
            PermissionOptionKind::RejectAlways,
        ]),
    }
    .unwrap_or(PermissionDecision::Cancelled)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
