//! Stream engine: drives one run from a user turn to termination.
//!
//! A producer task consumes runtime events, converts them into wire
//! envelopes, and feeds a bounded channel the SSE handler drains. The
//! producer polls the stop flag between events, detects interrupts after
//! the stream drains, and runs its finalizer on every exit path —
//! completion, interrupt, stop, client disconnect, or error — so the
//! assistant message is persisted and the task deregistered no matter how
//! the run ended.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use strand_domain::identity::Caller;
use strand_domain::llm::RunMessage;
use strand_domain::{Error, Result};
use strand_runtime::checkpoint::read_state_with_retry;
use strand_runtime::command::ResumeCommand;
use strand_runtime::event::RuntimeEventKind;
use strand_runtime::runtime::{EventStream, GraphRuntime, RunConfig, RunInput};

use crate::runtime::now_ms;
use crate::state::AppState;

/// Interrupt detection: retries against the contended checkpoint store.
const STATE_READ_ATTEMPTS: u32 = 3;
const STATE_READ_BACKOFF: Duration = Duration::from_millis(100);
/// Fallback message recovery uses a shorter schedule.
const MESSAGE_READ_ATTEMPTS: u32 = 2;
const MESSAGE_READ_BACKOFF: Duration = Duration::from_millis(50);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Content,
    ToolStart,
    ToolEnd,
    ChatModelStart,
    ChatModelEnd,
    NodeStart,
    NodeEnd,
    Status,
    Interrupt,
    Done,
    Error,
}

/// One SSE event as delivered to the client.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub thread_id: String,
    pub run_id: String,
    pub node_name: String,
    pub timestamp: i64,
    pub tags: Vec<String>,
    pub data: Value,
}

impl Envelope {
    fn new(kind: EnvelopeKind, thread_id: &str, run_id: &Uuid) -> Self {
        Self {
            kind,
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            node_name: String::new(),
            timestamp: now_ms(),
            tags: Vec::new(),
            data: json!({}),
        }
    }

    fn on_node(mut self, node: &str) -> Self {
        self.node_name = node.to_string();
        self
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TurnRequest {
    pub caller: Caller,
    pub message: String,
    pub thread_id: Option<String>,
    pub graph_id: Option<Uuid>,
    pub metadata: Option<Value>,
}

pub struct ResumeRequest {
    pub caller: Caller,
    pub thread_id: String,
    pub command: ResumeCommand,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry points
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a fresh turn.
///
/// Everything that must fail *before* the stream opens — access checks,
/// resolution, committing the user message — happens here; the returned
/// receiver only ever yields envelopes. The task is registered before the
/// first event so an immediate stop request can find it.
pub async fn start_turn(
    state: AppState,
    request: TurnRequest,
) -> Result<(String, Uuid, mpsc::Receiver<Envelope>)> {
    let run_id = Uuid::new_v4();

    // 1. Conversation + user message, committed before any streaming.
    let (thread_id, _conversation) = state.conversations.get_or_create(
        request.thread_id.clone(),
        request.caller.user_id,
        &request.message,
        json!({}),
    )?;
    state.conversations.append_user_message(
        &thread_id,
        &request.message,
        request.metadata.clone(),
    )?;

    // 2. LLM params + runtime resolution (access checks happen here).
    let llm_params = state.llm_params();
    let resolved = state
        .resolver
        .resolve(request.graph_id, &request.caller, &llm_params)?;

    let config = RunConfig {
        thread_id: thread_id.clone(),
        run_id,
        recursion_limit: state.config.execution.recursion_limit,
    };
    let input = RunInput {
        messages: vec![RunMessage::user(request.message.clone())],
        context: resolved.context.clone(),
    };
    let events = resolved.runtime.stream_events(input, &config).await?;

    // 3. Task registration precedes the first envelope.
    state.tasks.register(&thread_id).await;

    // 4. Producer task; the receiver is handed to the SSE writer.
    let (tx, rx) = mpsc::channel(state.config.execution.stream_buffer);
    let runtime = resolved.runtime.clone();
    let graph_id = resolved.graph_id;
    tokio::spawn(async move {
        run_producer(state, tx, events, runtime, config, graph_id, "connected").await;
    });

    Ok((thread_id, run_id, rx))
}

/// Resume an interrupted turn. Mirrors a fresh turn, except the
/// conversation must carry the interrupt marker and the checkpoint must
/// still hold pending tasks.
pub async fn resume_turn(
    state: AppState,
    request: ResumeRequest,
) -> Result<(String, Uuid, mpsc::Receiver<Envelope>)> {
    let run_id = Uuid::new_v4();
    let thread_id = request.thread_id.clone();

    let conversation = state.conversations.require(&thread_id)?;
    if conversation.owner_user_id != request.caller.user_id && !request.caller.is_superuser {
        return Err(Error::Forbidden("no access to conversation".into()));
    }
    let graph_id = conversation
        .interrupted_graph_id()
        .ok_or_else(|| Error::NotFound("no interrupted execution for thread".into()))?;

    // The runtime is stateless across requests; re-resolve, the checkpoint
    // carries the continuation.
    let llm_params = state.llm_params();
    let resolved = state
        .resolver
        .resolve(Some(graph_id), &request.caller, &llm_params)?;

    let config = RunConfig {
        thread_id: thread_id.clone(),
        run_id,
        recursion_limit: state.config.execution.recursion_limit,
    };

    // Validate the checkpoint before opening the stream.
    let snapshot = read_state_with_retry(
        resolved.runtime.as_ref(),
        &config,
        STATE_READ_ATTEMPTS,
        STATE_READ_BACKOFF,
    )
    .await;
    if !snapshot.map(|s| s.is_suspended()).unwrap_or(false) {
        return Err(Error::NotFound(
            "no pending interrupt; execution may have expired".into(),
        ));
    }

    let events = resolved.runtime.resume(request.command, &config).await?;

    state.tasks.register(&thread_id).await;

    let (tx, rx) = mpsc::channel(state.config.execution.stream_buffer);
    let runtime = resolved.runtime.clone();
    tokio::spawn(async move {
        run_producer(state, tx, events, runtime, config, Some(graph_id), "resumed").await;
    });

    Ok((thread_id, run_id, rx))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Producer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Local run state accumulated by the event loop.
#[derive(Default)]
struct RunState {
    stopped: bool,
    interrupted: bool,
    /// Receiver dropped mid-stream: persist, but emit nothing further.
    client_gone: bool,
    /// A runtime error envelope was already emitted.
    errored: bool,
    assistant_content: String,
    all_messages: Vec<RunMessage>,
}

/// Deliver one envelope. A dropped receiver marks the client gone and
/// suppresses all further emission; backpressure from the bounded buffer
/// simply suspends the producer.
async fn emit(tx: &mpsc::Sender<Envelope>, run: &mut RunState, envelope: Envelope) -> bool {
    if run.client_gone {
        return false;
    }
    match tx.send(envelope).await {
        Ok(()) => true,
        Err(_) => {
            run.client_gone = true;
            false
        }
    }
}

async fn run_producer(
    state: AppState,
    tx: mpsc::Sender<Envelope>,
    events: EventStream,
    runtime: Arc<dyn GraphRuntime>,
    config: RunConfig,
    graph_id: Option<Uuid>,
    status: &'static str,
) {
    let thread_id = config.thread_id.clone();
    tracing::debug!(thread_id = %thread_id, run_id = %config.run_id, status, "run started");

    let mut run = RunState::default();
    drive(
        &state,
        &tx,
        events,
        runtime.as_ref(),
        &config,
        graph_id,
        status,
        &mut run,
    )
    .await;

    // ── Finalizer — runs on every exit path ──────────────────────────
    state.tasks.unregister(&thread_id);

    // Persistence is best-effort here: the request may already be gone, so
    // failures are logged rather than surfaced.
    if !run.all_messages.is_empty() {
        if let Err(e) = state
            .conversations
            .append_assistant_message(&thread_id, &run.all_messages)
        {
            tracing::error!(thread_id = %thread_id, error = %e, "failed to persist assistant message");
        }
    } else if !run.assistant_content.is_empty() {
        let fallback = [RunMessage::assistant(run.assistant_content.clone())];
        if let Err(e) = state
            .conversations
            .append_assistant_message(&thread_id, &fallback)
        {
            tracing::error!(thread_id = %thread_id, error = %e, "failed to persist assistant message");
        }
    }

    runtime.cleanup().await;

    if !run.interrupted {
        if let Err(e) = state.conversations.clear_interrupt_marker(&thread_id) {
            // Missing conversation here means the thread was deleted
            // underneath the run; nothing left to clear.
            tracing::debug!(thread_id = %thread_id, error = %e, "interrupt marker clear skipped");
        }
    }

    tracing::debug!(
        thread_id = %thread_id,
        run_id = %config.run_id,
        stopped = run.stopped,
        interrupted = run.interrupted,
        client_gone = run.client_gone,
        content_preview = %crate::runtime::truncate_str(&run.assistant_content, 80),
        "run finished"
    );
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    state: &AppState,
    tx: &mpsc::Sender<Envelope>,
    mut events: EventStream,
    runtime: &dyn GraphRuntime,
    config: &RunConfig,
    graph_id: Option<Uuid>,
    status: &'static str,
    run: &mut RunState,
) {
    let thread_id = &config.thread_id;
    let run_id = &config.run_id;

    if !emit(
        tx,
        run,
        Envelope::new(EnvelopeKind::Status, thread_id, run_id)
            .with_data(json!({"status": status})),
    )
    .await
    {
        return;
    }

    // ── Event loop ───────────────────────────────────────────────────
    while let Some(item) = events.next().await {
        // Cooperative stop, observed at most one event late.
        if state.tasks.is_stopped(thread_id) {
            run.stopped = true;
            break;
        }
        if run.client_gone {
            run.stopped = true;
            break;
        }

        let event = match item {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e, "runtime error during stream");
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::Error, thread_id, run_id)
                        .with_data(json!({"message": e.to_string(), "code": "internal"})),
                )
                .await;
                run.errored = true;
                break;
            }
        };

        let node = event.node().unwrap_or_default().to_string();
        let tags = event.tags.clone();
        match event.kind {
            RuntimeEventKind::ChatModelStream => {
                let Some(delta) = event.data.chunk.clone() else {
                    continue;
                };
                run.assistant_content.push_str(&delta);
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::Content, thread_id, run_id)
                        .on_node(&node)
                        .with_tags(tags)
                        .with_data(json!({"delta": delta})),
                )
                .await;
            }
            RuntimeEventKind::ChatModelStart => {
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::ChatModelStart, thread_id, run_id)
                        .on_node(&node)
                        .with_tags(tags),
                )
                .await;
            }
            RuntimeEventKind::ChatModelEnd => {
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::ChatModelEnd, thread_id, run_id)
                        .on_node(&node)
                        .with_tags(tags)
                        .with_data(json!({"output": event.data.output})),
                )
                .await;
            }
            RuntimeEventKind::ToolStart => {
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::ToolStart, thread_id, run_id)
                        .on_node(&node)
                        .with_tags(tags)
                        .with_data(json!({
                            "tool": event.name,
                            "input": event.data.input,
                        })),
                )
                .await;
            }
            RuntimeEventKind::ToolEnd => {
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::ToolEnd, thread_id, run_id)
                        .on_node(&node)
                        .with_tags(tags)
                        .with_data(json!({
                            "tool": event.name,
                            "output": event.data.output,
                        })),
                )
                .await;
            }
            RuntimeEventKind::ChainStart if event.is_node_event() => {
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::NodeStart, thread_id, run_id)
                        .on_node(&node)
                        .with_tags(tags)
                        .with_data(json!({"node_name": node, "node_label": node})),
                )
                .await;
            }
            RuntimeEventKind::ChainEnd if event.is_node_event() => {
                // Keep the freshest full message list as the persistence
                // fallback should the loop exit early later on.
                if let Some(messages) = event.data.messages {
                    run.all_messages = messages;
                }
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::NodeEnd, thread_id, run_id)
                        .on_node(&node)
                        .with_tags(tags)
                        .with_data(json!({"node_name": node, "node_label": node})),
                )
                .await;
            }
            // Non-node chain events and unknown kinds are ignored.
            RuntimeEventKind::ChainStart
            | RuntimeEventKind::ChainEnd
            | RuntimeEventKind::Other => {}
        }
    }

    // ── Interrupt detection ──────────────────────────────────────────
    if !run.stopped && !run.errored && !run.client_gone {
        let snapshot =
            read_state_with_retry(runtime, config, STATE_READ_ATTEMPTS, STATE_READ_BACKOFF).await;

        if let Some(snapshot) = &snapshot {
            if snapshot.is_suspended() {
                let task = &snapshot.tasks[0];
                let node_label = task
                    .label
                    .clone()
                    .unwrap_or_else(|| task.target_node.clone());
                emit(
                    tx,
                    run,
                    Envelope::new(EnvelopeKind::Interrupt, thread_id, run_id)
                        .on_node(&task.target_node)
                        .with_data(json!({
                            "node_name": task.target_node,
                            "node_label": node_label,
                            "state": Value::Object(snapshot.values.clone()),
                            "thread_id": thread_id,
                        })),
                )
                .await;
                match graph_id {
                    Some(graph_id) => {
                        if let Err(e) =
                            state.conversations.set_interrupt_marker(thread_id, graph_id)
                        {
                            tracing::error!(thread_id = %thread_id, error = %e, "failed to set interrupt marker");
                        }
                    }
                    None => {
                        tracing::warn!(thread_id = %thread_id, "interrupt on graphless run; marker not set");
                    }
                }
                run.interrupted = true;
            }
        }

        // Fallback message recovery when the runtime never surfaced them.
        if run.all_messages.is_empty() {
            if let Some(snapshot) = read_state_with_retry(
                runtime,
                config,
                MESSAGE_READ_ATTEMPTS,
                MESSAGE_READ_BACKOFF,
            )
            .await
            {
                run.all_messages = snapshot.messages();
            }
        }
    }

    // ── Completion signaling ─────────────────────────────────────────
    if run.interrupted {
        // The interrupt envelope is the stream's last data event; the
        // client resumes later.
    } else if run.stopped && !run.client_gone {
        emit(
            tx,
            run,
            Envelope::new(EnvelopeKind::Error, thread_id, run_id)
                .with_data(json!({"message": "Stopped by user", "code": "stopped"})),
        )
        .await;
    } else if !run.errored && !run.client_gone {
        emit(tx, run, Envelope::new(EnvelopeKind::Done, thread_id, run_id)).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
