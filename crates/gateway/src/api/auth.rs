//! API authentication middleware and caller identity extraction.
//!
//! The bearer token (config or env var named by `server.api_token_env`) is
//! read **once at startup** and cached as a SHA-256 digest in `AppState`.
//! When no token is configured the server logs a warning once and allows
//! unauthenticated access (dev mode).
//!
//! Identity verification is outside the execution core: once the bearer
//! token is accepted, the caller identity arrives out-of-band in headers
//! (`X-User-Id`, optional `X-Workspace-Role`, `X-Superuser`) placed there
//! by the fronting auth layer.

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use strand_domain::identity::{Caller, WorkspaceRole};
use strand_domain::Error;

use crate::api::ApiError;
use crate::state::AppState;

/// Axum middleware enforcing bearer-token authentication on protected
/// routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    axum::extract::State(state): axum::extract::State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // `api_token_hash` is `None` in dev mode (no token configured).
    let expected_hash = match &state.api_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    // Hash the provided token to a fixed-length digest, then compare in
    // constant time so the token length does not leak.
    let provided_hash = Sha256::digest(provided.as_bytes());
    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return ApiError(Error::Unauthorized("invalid or missing API token".into()))
            .into_response();
    }

    next.run(req).await
}

/// Extracts the resolved caller identity from request headers.
pub struct CallerIdentity(pub Caller);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let user_id = header("x-user-id")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .ok_or_else(|| {
                ApiError(Error::Unauthorized(
                    "missing or invalid X-User-Id header".into(),
                ))
            })?;

        let mut caller = Caller::user(user_id);
        caller.is_superuser = header("x-superuser").as_deref() == Some("true");
        caller.workspace_role = header("x-workspace-role").and_then(|raw| match raw.as_str() {
            "viewer" => Some(WorkspaceRole::Viewer),
            "editor" => Some(WorkspaceRole::Editor),
            "admin" => Some(WorkspaceRole::Admin),
            _ => None,
        });

        Ok(Self(caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderValue;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, ApiError> {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        for (name, value) in headers {
            request.headers_mut().insert(
                axum::http::header::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        let (mut parts, ()) = request.into_parts();
        CallerIdentity::from_request_parts(&mut parts, &())
            .await
            .map(|c| c.0)
    }

    #[tokio::test]
    async fn extracts_full_identity() {
        let user_id = Uuid::new_v4();
        let caller = extract(&[
            ("x-user-id", &user_id.to_string()),
            ("x-workspace-role", "admin"),
            ("x-superuser", "true"),
        ])
        .await
        .unwrap();
        assert_eq!(caller.user_id, user_id);
        assert!(caller.is_superuser);
        assert_eq!(caller.workspace_role, Some(WorkspaceRole::Admin));
    }

    #[tokio::test]
    async fn missing_user_header_is_unauthorized() {
        let err = extract(&[]).await.unwrap_err();
        assert_eq!(err.0.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn malformed_user_id_is_unauthorized() {
        let err = extract(&[("x-user-id", "not-a-uuid")]).await.unwrap_err();
        assert_eq!(err.0.kind(), "unauthorized");
    }

    #[tokio::test]
    async fn unknown_role_is_ignored() {
        let user_id = Uuid::new_v4();
        let caller = extract(&[
            ("x-user-id", &user_id.to_string()),
            ("x-workspace-role", "owner"),
        ])
        .await
        .unwrap();
        assert!(caller.workspace_role.is_none());
        assert!(!caller.is_superuser);
    }
}
