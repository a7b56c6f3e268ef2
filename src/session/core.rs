//! Session state machine.
//!
//! One [`Session`] owns one agent process and its control channel. The reader
//! task is the sole producer of domain events and preserves the process's
//! emission order; commands (`send_message`, `resolve_permission`,
//! `cancel_turn`, `terminate`) may be issued concurrently from any number of
//! callers.
//!
//! # Lifecycle
//!
//! `Idle → Starting → Running → Terminating → Terminated`, with `Crashed`
//! reachable from any non-terminal state when the process dies or a stream
//! closes without an explicit termination request. Terminal transitions drain
//! every pending control waiter and answer every outstanding permission
//! prompt with a formal rejection — the agent process is never left waiting
//! on a reply this layer can no longer produce.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::control::ControlChannel;
use crate::models::{
    PermissionDecision, PermissionRequest, SessionEvent, SessionState, UsageTotals,
};
use crate::process::{
    monitor_exit, run_stderr_drain, spawn_agent, ProcessExit, SpawnConfig, StderrRing,
};
use crate::session::registry::PermissionRegistry;
use crate::session::writer::run_writer;
use crate::wire::{frame, parse_line, ControlRequest, Frame, LineCodec};
use crate::{AppError, Result};

// ── Shared state ─────────────────────────────────────────────────────────────

/// State shared between the session handle, its clones, and its tasks.
#[derive(Debug)]
struct Shared {
    /// Session identifier; replaced by the process's `session_started`
    /// marker when one arrives.
    session_id: Mutex<String>,
    /// Lifecycle state, observable through a watch channel.
    state_tx: watch::Sender<SessionState>,
    /// Monotonic event sequence counter.
    seq: AtomicU64,
    /// Subscriber fan-out; bounded per subscriber.
    events: broadcast::Sender<SessionEvent>,
    /// Accumulated usage totals.
    usage: Mutex<UsageTotals>,
    /// Outstanding permission prompts keyed by tool-call id.
    registry: PermissionRegistry,
    /// Set once the process acknowledged a turn interrupt; cleared by the
    /// next `send_message`. While set, tool frames for the turn are dropped.
    turn_cancelled: AtomicBool,
    /// Set by `terminate()`; decides Terminated vs Crashed at finalisation.
    terminate_requested: AtomicBool,
    /// Correlation id of an in-flight interrupt request, if any.
    pending_interrupt: Mutex<Option<String>>,
    /// Wiring created at `start()`; absent while Idle.
    runtime: Mutex<Option<Runtime>>,
}

/// Per-start wiring: channels, tokens, diagnostics.
#[derive(Debug)]
struct Runtime {
    writer_tx: mpsc::Sender<Value>,
    control: ControlChannel,
    cancel: CancellationToken,
    kill: CancellationToken,
    stderr: StderrRing,
}

// ── Session ──────────────────────────────────────────────────────────────────

/// One conversation bound to one running agent process.
///
/// Cheaply cloneable; all clones share the same underlying session.
#[derive(Debug, Clone)]
pub struct Session {
    shared: Arc<Shared>,
    config: AgentConfig,
}

impl Session {
    /// Construct an idle session. No process is started until [`start`].
    ///
    /// [`start`]: Session::start
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let (state_tx, _) = watch::channel(SessionState::Idle);

        Self {
            shared: Arc::new(Shared {
                session_id: Mutex::new(Uuid::new_v4().to_string()),
                state_tx,
                seq: AtomicU64::new(0),
                events,
                usage: Mutex::new(UsageTotals::default()),
                registry: PermissionRegistry::new(),
                turn_cancelled: AtomicBool::new(false),
                terminate_requested: AtomicBool::new(false),
                pending_interrupt: Mutex::new(None),
                runtime: Mutex::new(None),
            }),
            config,
        }
    }

    /// Subscribe to the ordered event stream.
    ///
    /// Events already emitted are not replayed; a subscriber that falls more
    /// than the configured capacity behind observes a lagged receive and can
    /// detect the gap through [`SessionEvent::seq`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    /// Suspend until the session reaches a terminal state.
    pub async fn wait_terminal(&self) -> SessionState {
        let mut rx = self.shared.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return *self.shared.state_tx.borrow();
            }
        }
    }

    /// Current session identifier.
    pub async fn session_id(&self) -> String {
        self.shared.session_id.lock().await.clone()
    }

    /// Snapshot of accumulated usage totals.
    pub async fn usage_totals(&self) -> UsageTotals {
        self.shared.usage.lock().await.clone()
    }

    /// Number of permission prompts awaiting a decision.
    pub async fn pending_permission_count(&self) -> usize {
        self.shared.registry.len().await
    }

    /// Whether a permission prompt is pending for `tool_call_id`.
    pub async fn has_pending_permission(&self, tool_call_id: &str) -> bool {
        self.shared.registry.has_pending(tool_call_id).await
    }

    /// The agent's most recent stderr lines, oldest first.
    pub async fn stderr_snapshot(&self) -> Vec<String> {
        let runtime = self.shared.runtime.lock().await;
        match runtime.as_ref() {
            Some(rt) => rt.stderr.snapshot().await,
            None => Vec::new(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Spawn the agent process and begin bidirectional traffic.
    ///
    /// Transitions `Idle → Starting → Running`. The spawner's ready-signal
    /// watchdog bounds the `Starting` phase.
    ///
    /// # Errors
    ///
    /// - [`AppError::State`] — the session was already started.
    /// - [`AppError::Spawn`] — the executable could not be launched or did
    ///   not become ready; the session transitions to `Crashed`.
    pub async fn start(&self) -> Result<()> {
        self.transition(SessionState::Starting, None).await?;

        let session_id = self.session_id().await;
        let spawn_config = SpawnConfig {
            agent_binary: self.config.agent_binary.clone(),
            agent_args: self.config.agent_args.clone(),
            workspace_root: self.config.workspace_root.clone(),
            startup_timeout: self.config.startup_timeout(),
            env_passthrough: self.config.env_passthrough.clone(),
        };

        let conn = match spawn_agent(&spawn_config, &session_id).await {
            Ok(conn) => conn,
            Err(err) => {
                self.transition(SessionState::Crashed, Some(err.to_string()))
                    .await
                    .ok();
                return Err(err);
            }
        };

        let (writer_tx, writer_rx) = mpsc::channel::<Value>(self.config.event_channel_capacity);
        let (exit_tx, exit_rx) = mpsc::channel::<ProcessExit>(1);
        let cancel = CancellationToken::new();
        let kill = CancellationToken::new();
        let stderr_ring = StderrRing::new(self.config.stderr_ring_capacity);
        let control = ControlChannel::new(session_id.clone(), writer_tx.clone());

        {
            let mut runtime = self.shared.runtime.lock().await;
            *runtime = Some(Runtime {
                writer_tx: writer_tx.clone(),
                control: control.clone(),
                cancel: cancel.clone(),
                kill: kill.clone(),
                stderr: stderr_ring.clone(),
            });
        }

        // Writer task.
        {
            let id = session_id.clone();
            let token = cancel.clone();
            let max_line = self.config.max_frame_bytes;
            tokio::spawn(async move {
                if let Err(err) = run_writer(id.clone(), conn.stdin, writer_rx, max_line, token).await
                {
                    warn!(session_id = id.as_str(), %err, "writer task ended with error");
                }
            });
        }

        // Stderr diagnostics drain.
        tokio::spawn(run_stderr_drain(
            session_id.clone(),
            conn.stderr,
            stderr_ring,
            cancel.clone(),
        ));

        // Exit monitor owns the child from here on.
        let _monitor = monitor_exit(
            session_id.clone(),
            conn.child,
            self.config.shutdown_grace(),
            exit_tx,
            kill,
            cancel.clone(),
        );

        // The ready signal is the first protocol frame; handle it before the
        // reader starts so the agent-assigned session id is visible as soon
        // as start() returns.
        let ctx = ReaderCtx {
            shared: Arc::clone(&self.shared),
            control,
            writer_tx,
            cancel: cancel.clone(),
            max_frame_bytes: self.config.max_frame_bytes,
        };
        handle_line(&ctx, &session_id, &conn.ready_line).await;

        // Reader task: sole producer of domain events from here on.
        tokio::spawn(run_read_loop(ctx, conn.stdout, exit_rx));

        self.transition(SessionState::Running, None).await?;
        info!(session_id, "session running");
        Ok(())
    }

    /// Queue one user message. Fire-and-forget: the assistant's output
    /// arrives later as a stream of frames.
    ///
    /// # Errors
    ///
    /// - [`AppError::State`] — session is not `Running`.
    /// - [`AppError::Wire`] — the outbound stream is closed.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.ensure_running("send_message")?;
        self.shared.turn_cancelled.store(false, Ordering::SeqCst);

        let writer_tx = self.writer_handle().await?;
        writer_tx
            .send(frame::user_message(text))
            .await
            .map_err(|_| AppError::Wire("write failed: outbound stream closed".into()))
    }

    /// Answer a pending permission prompt.
    ///
    /// Idempotent: resolving a tool-call id with no pending entry is a
    /// no-op (first resolution wins). Choosing an option the request never
    /// offered — including any option on a zero-option request — is
    /// rejected and leaves the prompt pending.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] — `decision` names an unknown option id.
    /// - [`AppError::Wire`] — the outbound stream is closed.
    pub async fn resolve_permission(
        &self,
        tool_call_id: &str,
        decision: PermissionDecision,
    ) -> Result<()> {
        let Some(request) = self.shared.registry.take(tool_call_id).await else {
            debug!(tool_call_id, "resolve_permission: no pending entry, no-op");
            return Ok(());
        };

        if let PermissionDecision::Selected(option_id) = &decision {
            if !request.has_option(option_id) {
                let request_id = request.request_id.clone();
                self.shared.registry.insert(request).await;
                return Err(AppError::NotFound(format!(
                    "permission request '{request_id}' offers no option '{option_id}'"
                )));
            }
        }

        let frame = frame::permission_response(&request, &decision);
        let writer_tx = self.writer_handle().await?;
        writer_tx
            .send(frame)
            .await
            .map_err(|_| AppError::Wire("write failed: outbound stream closed".into()))?;

        debug!(
            tool_call_id,
            request_id = request.request_id.as_str(),
            "permission resolved"
        );
        Ok(())
    }

    /// Cancel the current turn.
    ///
    /// Rejects every outstanding permission prompt, then sends an interrupt
    /// control request and waits for its acknowledgement. Idempotent:
    /// cancelling twice, cancelling with no active turn, or cancelling a
    /// session that already terminated is a no-op.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] — the process did not acknowledge within the
    ///   configured deadline.
    /// - [`AppError::Wire`] — the outbound stream is closed.
    pub async fn cancel_turn(&self) -> Result<()> {
        if self.state() != SessionState::Running {
            debug!("cancel_turn: session not running, no-op");
            return Ok(());
        }
        if self.shared.turn_cancelled.load(Ordering::SeqCst) {
            debug!("cancel_turn: turn already cancelled, no-op");
            return Ok(());
        }

        let (control, writer_tx) = {
            let runtime = self.shared.runtime.lock().await;
            let Some(rt) = runtime.as_ref() else {
                return Ok(());
            };
            (rt.control.clone(), rt.writer_tx.clone())
        };

        reject_pending_permissions(&self.shared.registry, &writer_tx).await;

        let request_id = control.allocate_id();
        *self.shared.pending_interrupt.lock().await = Some(request_id.clone());

        let outcome = control
            .request_with_id(
                &request_id,
                frame::interrupt_request(&request_id),
                Some(self.config.interrupt_ack_deadline()),
            )
            .await;

        *self.shared.pending_interrupt.lock().await = None;

        match outcome {
            Ok(_ack) => {
                self.shared.turn_cancelled.store(true, Ordering::SeqCst);
                Ok(())
            }
            // Session ended or the waiter was dropped while we waited —
            // cancellation is moot, keep the operation idempotent.
            Err(AppError::SessionTerminated(_) | AppError::Cancelled(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Request orderly termination.
    ///
    /// Valid in any state; terminal states and `Idle` short-circuit. The
    /// exit monitor escalates from the terminate frame to a hard kill over
    /// the configured grace window; the reader finalises the state to
    /// `Terminated` once the process is gone.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the `Result` mirrors the backend
    /// contract.
    pub async fn terminate(&self) -> Result<()> {
        let current = self.state();
        if current.is_terminal() {
            return Ok(());
        }
        if current == SessionState::Idle {
            self.shared.terminate_requested.store(true, Ordering::SeqCst);
            self.transition(SessionState::Terminating, None).await.ok();
            self.transition(SessionState::Terminated, Some("never started".into()))
                .await
                .ok();
            return Ok(());
        }

        self.shared.terminate_requested.store(true, Ordering::SeqCst);
        self.transition(SessionState::Terminating, None).await.ok();

        let (writer_tx, kill) = {
            let runtime = self.shared.runtime.lock().await;
            let Some(rt) = runtime.as_ref() else {
                return Ok(());
            };
            (rt.writer_tx.clone(), rt.kill.clone())
        };

        reject_pending_permissions(&self.shared.registry, &writer_tx).await;

        // Best effort: the process may already be gone.
        writer_tx.send(frame::terminate_request()).await.ok();
        kill.cancel();

        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Guarded lifecycle transition; emits `LifecycleChanged` on success.
    async fn transition(&self, next: SessionState, reason: Option<String>) -> Result<()> {
        let mut granted = false;
        self.shared.state_tx.send_modify(|state| {
            if state.can_transition_to(next) {
                *state = next;
                granted = true;
            }
        });

        if !granted {
            return Err(AppError::State(format!(
                "cannot transition from {:?} to {next:?}",
                self.state()
            )));
        }

        emit(&self.shared, |seq| SessionEvent::LifecycleChanged {
            seq,
            state: next,
            reason,
        });
        Ok(())
    }

    /// Require the `Running` state for a command.
    fn ensure_running(&self, op: &str) -> Result<()> {
        let state = self.state();
        if state == SessionState::Running {
            Ok(())
        } else if state.is_terminal() {
            Err(AppError::SessionTerminated(format!(
                "{op} invalid: session is {state:?}"
            )))
        } else {
            Err(AppError::State(format!("{op} invalid in state {state:?}")))
        }
    }

    /// Outbound writer handle, failing when the session never started.
    async fn writer_handle(&self) -> Result<mpsc::Sender<Value>> {
        let runtime = self.shared.runtime.lock().await;
        runtime
            .as_ref()
            .map(|rt| rt.writer_tx.clone())
            .ok_or_else(|| AppError::State("session not started".into()))
    }
}

// ── Event emission ───────────────────────────────────────────────────────────

/// Allocate the next sequence number and broadcast `build(seq)`.
///
/// A send error only means no subscriber is currently attached.
fn emit<F>(shared: &Shared, build: F)
where
    F: FnOnce(u64) -> SessionEvent,
{
    let seq = shared.seq.fetch_add(1, Ordering::SeqCst);
    shared.events.send(build(seq)).ok();
}

/// Answer every outstanding permission prompt with a formal rejection.
async fn reject_pending_permissions(
    registry: &PermissionRegistry,
    writer_tx: &mpsc::Sender<Value>,
) {
    for request in registry.drain().await {
        debug!(
            tool_call_id = request.tool_call.id.as_str(),
            request_id = request.request_id.as_str(),
            "rejecting outstanding permission prompt"
        );
        writer_tx
            .send(frame::permission_rejection(&request.request_id))
            .await
            .ok();
    }
}

// ── Reader task ──────────────────────────────────────────────────────────────

/// Everything the reader needs, cloned out of the runtime at start.
struct ReaderCtx {
    shared: Arc<Shared>,
    control: ControlChannel,
    writer_tx: mpsc::Sender<Value>,
    cancel: CancellationToken,
    max_frame_bytes: usize,
}

/// Reader task — drives the framed stdout stream, translating frames into
/// domain events in decode order. The only producer of session events.
async fn run_read_loop<R>(ctx: ReaderCtx, stdout: R, mut exit_rx: mpsc::Receiver<ProcessExit>)
where
    R: AsyncRead + Unpin + Send,
{
    let session_id = ctx.shared.session_id.lock().await.clone();
    let mut framed = FramedRead::new(stdout, LineCodec::with_max_length(ctx.max_frame_bytes));

    loop {
        tokio::select! {
            biased;

            () = ctx.cancel.cancelled() => {
                debug!(session_id, "reader: cancellation received, stopping");
                return;
            }

            exit = exit_rx.recv() => {
                let reason = exit.map_or_else(
                    || "exit monitor detached".to_owned(),
                    |e| e.reason,
                );
                debug!(session_id, reason = reason.as_str(), "reader: process exit reported");
                finalise(&ctx, &reason).await;
                return;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(session_id, "reader: EOF detected");
                        finalise(&ctx, "stream closed").await;
                        return;
                    }

                    Some(Err(AppError::Wire(ref msg))) => {
                        // Codec-level error (e.g. line too long) — log and continue.
                        warn!(
                            session_id,
                            error = msg.as_str(),
                            "reader: codec framing error, skipping"
                        );
                    }

                    Some(Err(e)) => {
                        warn!(session_id, error = %e, "reader: IO error, stopping");
                        finalise(&ctx, &format!("stream error: {e}")).await;
                        return;
                    }

                    Some(Ok(line)) => {
                        handle_line(&ctx, &session_id, &line).await;
                    }
                }
            }
        }
    }
}

/// Translate one decoded line into zero or more domain events.
async fn handle_line(ctx: &ReaderCtx, session_id: &str, line: &str) {
    let Some(frame) = parse_line(session_id, line) else {
        return; // Blank line.
    };

    let shared = &ctx.shared;
    match frame {
        Frame::AssistantText { text, model } => {
            emit(shared, |seq| SessionEvent::TextOutput { seq, text, model });
        }

        Frame::ToolCallUpdate(tool_call) => {
            if shared.turn_cancelled.load(Ordering::SeqCst) {
                debug!(
                    session_id,
                    tool_call_id = tool_call.id.as_str(),
                    "reader: dropping tool frame for cancelled turn"
                );
                return;
            }
            let pending = shared.registry.has_pending(&tool_call.id).await;
            emit(shared, |seq| SessionEvent::ToolUse {
                seq,
                tool_call,
                permission_pending: pending,
            });
        }

        Frame::ControlRequest(ControlRequest::Permission(request)) => {
            handle_permission_ask(ctx, session_id, request).await;
        }

        Frame::ControlRequest(ControlRequest::Unknown { request_id, raw }) => {
            debug!(
                session_id,
                request_id = request_id.as_str(),
                "reader: unknown control request subtype"
            );
            emit(shared, |seq| SessionEvent::Unrecognized {
                seq,
                raw: raw.to_string(),
            });
        }

        Frame::ControlResponse {
            request_id,
            response,
        } => {
            let interrupt = ctx
                .shared
                .pending_interrupt
                .lock()
                .await
                .as_deref()
                .is_some_and(|id| id == request_id);
            if interrupt {
                // Drop tool frames before the waiter even observes the ack.
                shared.turn_cancelled.store(true, Ordering::SeqCst);
            }
            // Unmatched ids are a correlation mismatch: logged, non-fatal.
            ctx.control.resolve(&request_id, response).await.ok();
        }

        Frame::Lifecycle { marker, session_id: reported } => {
            handle_lifecycle_marker(shared, session_id, &marker, reported).await;
        }

        Frame::Usage { model, usage } => {
            let totals = {
                let mut guard = shared.usage.lock().await;
                guard.record(&model, &usage);
                guard.clone()
            };
            emit(shared, |seq| SessionEvent::UsageChanged { seq, totals });
        }

        Frame::Error { message } => {
            emit(shared, |seq| SessionEvent::Error { seq, message });
        }

        Frame::Unknown { raw } | Frame::Malformed { raw } => {
            emit(shared, |seq| SessionEvent::Unrecognized { seq, raw });
        }
    }
}

/// Register a permission ask and surface it to subscribers.
///
/// The registry is the only owner of the pending entry; duplicates and asks
/// arriving after a turn was cancelled are answered immediately with a
/// rejection so the process never blocks on a dead prompt.
async fn handle_permission_ask(ctx: &ReaderCtx, session_id: &str, request: PermissionRequest) {
    let shared = &ctx.shared;

    if shared.turn_cancelled.load(Ordering::SeqCst) {
        debug!(
            session_id,
            request_id = request.request_id.as_str(),
            "reader: rejecting permission ask for cancelled turn"
        );
        ctx.writer_tx
            .send(frame::permission_rejection(&request.request_id))
            .await
            .ok();
        return;
    }

    let event_request = request.clone();
    if !shared.registry.insert(request).await {
        warn!(
            session_id,
            tool_call_id = event_request.tool_call.id.as_str(),
            "reader: duplicate permission ask, rejecting"
        );
        ctx.writer_tx
            .send(frame::permission_rejection(&event_request.request_id))
            .await
            .ok();
        return;
    }

    emit(shared, |seq| SessionEvent::PermissionNeeded {
        seq,
        request: event_request,
    });
}

/// Interpret a lifecycle marker. Unknown markers degrade to `Unrecognized`.
async fn handle_lifecycle_marker(
    shared: &Shared,
    session_id: &str,
    marker: &str,
    reported: Option<String>,
) {
    match marker {
        "session_started" => {
            if let Some(id) = reported {
                info!(session_id, assigned = id.as_str(), "session id assigned by agent");
                *shared.session_id.lock().await = id;
            }
            let state = *shared.state_tx.borrow();
            emit(shared, |seq| SessionEvent::LifecycleChanged {
                seq,
                state,
                reason: Some("session_started".into()),
            });
        }
        "session_ended" | "context_compacted" => {
            let state = *shared.state_tx.borrow();
            let reason = marker.to_owned();
            emit(shared, |seq| SessionEvent::LifecycleChanged {
                seq,
                state,
                reason: Some(reason),
            });
        }
        other => {
            debug!(session_id, marker = other, "reader: unknown lifecycle marker");
            let raw = other.to_owned();
            emit(shared, |seq| SessionEvent::Unrecognized { seq, raw });
        }
    }
}

/// Terminal transition: fix the final state, drain all waiters, answer all
/// prompts, then stop the remaining tasks.
async fn finalise(ctx: &ReaderCtx, reason: &str) {
    let shared = &ctx.shared;

    let target = if shared.terminate_requested.load(Ordering::SeqCst) {
        SessionState::Terminated
    } else {
        SessionState::Crashed
    };

    let mut granted = false;
    shared.state_tx.send_modify(|state| {
        if state.can_transition_to(target) {
            *state = target;
            granted = true;
        }
    });
    if !granted {
        // Already terminal — a second finaliser lost the race.
        return;
    }

    reject_pending_permissions(&shared.registry, &ctx.writer_tx).await;
    ctx.control.fail_all_terminated().await;

    let reason = reason.to_owned();
    emit(shared, |seq| SessionEvent::LifecycleChanged {
        seq,
        state: target,
        reason: Some(reason),
    });

    ctx.cancel.cancel();
}
