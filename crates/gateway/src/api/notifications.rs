//! Per-user notification stream.
//!
//! `GET /v1/notifications/events` — SSE of best-effort cross-session
//! signals for the authenticated caller (runs stopped from another
//! client, and similar nudges).

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;

use crate::api::auth::CallerIdentity;
use crate::state::AppState;

pub async fn notification_events_sse(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> impl IntoResponse {
    let mut rx = state.notifier.subscribe(caller.user_id);
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let data = serde_json::to_string(&notification).unwrap_or_default();
                    yield Ok::<_, std::convert::Infallible>(Event::default().data(data));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notification subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
