//! Conversation history endpoints.
//!
//! - `GET /v1/conversations`                      — caller's conversations
//! - `GET /v1/conversations/:thread_id`           — one conversation
//! - `GET /v1/conversations/:thread_id/messages`  — its message log

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use strand_domain::Error;

use crate::api::auth::CallerIdentity;
use crate::api::{ApiError, ApiResult};
use crate::state::AppState;

fn ensure_owner(
    state: &AppState,
    thread_id: &str,
    caller: &strand_domain::identity::Caller,
) -> Result<strand_conversations::Conversation, ApiError> {
    let conversation = state.conversations.require(thread_id)?;
    if conversation.owner_user_id != caller.user_id && !caller.is_superuser {
        return Err(ApiError(Error::Forbidden(
            "no access to conversation".into(),
        )));
    }
    Ok(conversation)
}

pub async fn list_conversations(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> Json<serde_json::Value> {
    let conversations = state.conversations.list_for_owner(caller.user_id);
    Json(json!({
        "conversations": conversations,
        "count": conversations.len(),
    }))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let conversation = ensure_owner(&state, &thread_id, &caller)?;
    Ok(Json(serde_json::to_value(conversation).map_err(Error::from)?))
}

pub async fn get_messages(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    ensure_owner(&state, &thread_id, &caller)?;
    let messages = state.conversations.messages(&thread_id)?;
    Ok(Json(json!({
        "thread_id": thread_id,
        "messages": messages,
        "count": messages.len(),
    })))
}
