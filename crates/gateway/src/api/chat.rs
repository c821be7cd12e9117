//! Chat API — the primary interface for running graph turns.
//!
//! - `POST /v1/chat/stream` — SSE stream of protocol envelopes
//! - `POST /v1/chat/resume` — SSE continuation of an interrupted run
//! - `POST /v1/chat/stop`   — cooperative stop + forceful cancel
//!
//! Each SSE event is a single `data:` line carrying one JSON envelope.
//! Errors raised before the stream opens surface as HTTP statuses; once
//! the stream is live, failures arrive as `error` envelopes.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use strand_runtime::command::ResumeCommand;

use crate::api::auth::CallerIdentity;
use crate::api::ApiError;
use crate::runtime::notify::Notification;
use crate::runtime::stream::{start_turn, resume_turn, Envelope, ResumeRequest, TurnRequest};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub graph_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResumeRequest {
    pub thread_id: String,
    #[serde(default)]
    pub command: ResumeCommand,
}

#[derive(Debug, Deserialize)]
pub struct ChatStopRequest {
    pub thread_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_stream(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Json(body): Json<ChatStreamRequest>,
) -> impl IntoResponse {
    let request = TurnRequest {
        caller,
        message: body.message,
        thread_id: body.thread_id,
        graph_id: body.graph_id,
        metadata: body.metadata,
    };

    match start_turn(state, request).await {
        Ok((_thread_id, _run_id, rx)) => Sse::new(envelope_stream(rx))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/resume
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_resume(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Json(body): Json<ChatResumeRequest>,
) -> impl IntoResponse {
    let request = ResumeRequest {
        caller,
        thread_id: body.thread_id,
        command: body.command,
    };

    match resume_turn(state, request).await {
        Ok((_thread_id, _run_id, rx)) => Sse::new(envelope_stream(rx))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

fn envelope_stream(
    mut rx: tokio::sync::mpsc::Receiver<Envelope>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(envelope) = rx.recv().await {
            let data = serde_json::to_string(&envelope).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
        // Receiver drained: the producer terminated the run.
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cooperative stop: sets the stop flag first so the stream loop can
/// persist gracefully, then fires the cancellation token to abort any
/// suspended I/O. A thread with no running task answers `not_running`.
pub async fn chat_stop(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Json(body): Json<ChatStopRequest>,
) -> impl IntoResponse {
    let stopped = state.tasks.stop(&body.thread_id);
    let cancelled = if stopped {
        state.tasks.cancel(&body.thread_id)
    } else {
        false
    };

    if stopped {
        tracing::info!(thread_id = %body.thread_id, "stop requested");
        // Nudge the user's other live sessions so their UIs update.
        state.notifier.publish(
            caller.user_id,
            Notification::new(
                "run_stopped",
                serde_json::json!({"thread_id": body.thread_id}),
            ),
        );
    }

    Json(serde_json::json!({
        "status": if stopped { "stopped" } else { "not_running" },
        "cancelled": cancelled,
    }))
}
