//! Copilot generation-session endpoints.
//!
//! - `POST /v1/copilot/sessions`              — submit, returns session id
//! - `GET  /v1/copilot/sessions/:id`          — status + accumulated content
//! - `GET  /v1/copilot/sessions/:id/events`   — SSE progress
//!
//! A generation session is not a conversation turn: the producer writes
//! into a TTL'd KV and the endpoints fail fast when that KV is
//! unreachable.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use strand_domain::Error;
use strand_runtime::llm::{HttpLlmClient, LlmClient};
use std::sync::Arc;

use crate::api::auth::CallerIdentity;
use crate::api::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub prompt: String,
}

pub async fn submit(
    State(state): State<AppState>,
    CallerIdentity(_caller): CallerIdentity,
    Json(body): Json<SubmitRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.prompt.trim().is_empty() {
        return Err(Error::Validation("prompt must not be empty".into()).into());
    }
    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(state.llm_params())?);
    let session_id = state.copilot.clone().submit(body.prompt, llm).await?;
    Ok(Json(json!({ "session_id": session_id, "status": "generating" })))
}

pub async fn get_session(
    State(state): State<AppState>,
    CallerIdentity(_caller): CallerIdentity,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let view = state
        .copilot
        .session(&session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("copilot session {session_id} not found")))?;
    Ok(Json(serde_json::to_value(view).map_err(Error::from)?))
}

pub async fn session_events_sse(
    State(state): State<AppState>,
    CallerIdentity(_caller): CallerIdentity,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    // Availability + existence check before opening the stream.
    let view = match state.copilot.session(&session_id).await {
        Ok(Some(view)) => view,
        Ok(None) => {
            return ApiError(Error::NotFound(format!(
                "copilot session {session_id} not found"
            )))
            .into_response()
        }
        Err(e) => return ApiError(e).into_response(),
    };

    // A terminal session replays its snapshot and closes.
    if view.status.is_terminal() {
        let data = serde_json::to_string(&view).unwrap_or_default();
        let stream = futures_util::stream::once(async move {
            Ok::<_, std::convert::Infallible>(Event::default().data(data))
        });
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    }

    let mut rx = state.copilot.subscribe(&session_id);
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = matches!(
                        event,
                        crate::runtime::copilot::CopilotEvent::Done
                            | crate::runtime::copilot::CopilotEvent::Error { .. }
                    );
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok::<_, std::convert::Infallible>(Event::default().data(data));
                    if done {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(session_id = %session_id, skipped, "copilot subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
