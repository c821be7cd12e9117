pub mod auth;
pub mod chat;
pub mod conversations;
pub mod copilot;
pub mod deployments;
pub mod graphs;
pub mod notifications;
pub mod system;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use strand_domain::Error;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wrapper so handlers can `?` domain errors straight into HTTP
/// responses: `{success: false, error: {kind, message}}` with the status
/// derived from the error kind.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "forbidden" => StatusCode::FORBIDDEN,
        "not_found" => StatusCode::NOT_FOUND,
        "validation" => StatusCode::UNPROCESSABLE_ENTITY,
        "conflict" => StatusCode::CONFLICT,
        "transient_infra" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }
        let body = serde_json::json!({
            "success": false,
            "error": { "kind": self.0.kind(), "message": self.0.to_string() },
        });
        (status, Json(body)).into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the full API router.
///
/// Routes split into **public** (health/version) and **protected** (gated
/// behind the bearer-token middleware). `state` is needed to wire the auth
/// middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/health", get(system::health))
        .route("/v1/version", get(system::version));

    let protected = Router::new()
        // Chat (core runtime)
        .route("/v1/chat/stream", post(chat::chat_stream))
        .route("/v1/chat/resume", post(chat::chat_resume))
        .route("/v1/chat/stop", post(chat::chat_stop))
        // Conversations
        .route("/v1/conversations", get(conversations::list_conversations))
        .route("/v1/conversations/:thread_id", get(conversations::get_conversation))
        .route(
            "/v1/conversations/:thread_id/messages",
            get(conversations::get_messages),
        )
        // Graph editor surface
        .route("/v1/graphs", post(graphs::create_graph).get(graphs::list_graphs))
        .route(
            "/v1/graphs/:graph_id",
            get(graphs::get_graph).delete(graphs::delete_graph),
        )
        .route(
            "/v1/graphs/:graph_id/state",
            get(graphs::get_state).put(graphs::save_state),
        )
        // Deployments
        .route(
            "/v1/graphs/:graph_id/deployments",
            post(deployments::deploy).get(deployments::list_versions),
        )
        .route("/v1/graphs/:graph_id/deploy", get(deployments::status))
        .route("/v1/graphs/:graph_id/undeploy", post(deployments::undeploy))
        .route(
            "/v1/graphs/:graph_id/deployments/:version",
            get(deployments::get_version)
                .patch(deployments::rename_version)
                .delete(deployments::delete_version),
        )
        .route(
            "/v1/graphs/:graph_id/deployments/:version/state",
            get(deployments::get_version_state),
        )
        .route(
            "/v1/graphs/:graph_id/deployments/:version/activate",
            post(deployments::activate_version),
        )
        .route(
            "/v1/graphs/:graph_id/deployments/:version/revert",
            post(deployments::revert_version),
        )
        // Copilot (generation sessions)
        .route("/v1/copilot/sessions", post(copilot::submit))
        .route("/v1/copilot/sessions/:session_id", get(copilot::get_session))
        .route(
            "/v1/copilot/sessions/:session_id/events",
            get(copilot::session_events_sse),
        )
        // Notifications (cross-session signals)
        .route(
            "/v1/notifications/events",
            get(notifications::notification_events_sse),
        )
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
