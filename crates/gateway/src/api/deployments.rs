//! Deployment version endpoints under `/v1/graphs/:graph_id`.
//!
//! Deploy snapshots the live graph into a content-hashed version; a
//! deploy with no changes returns the active version without creating a
//! new one. Revert destructively rewrites the live graph from a chosen
//! version's snapshot.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::CallerIdentity;
use crate::api::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "d_page")]
    pub page: usize,
    #[serde(default = "d_page_size")]
    pub page_size: usize,
}

fn d_page() -> usize {
    1
}
fn d_page_size() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

pub async fn deploy(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
    body: Option<Json<DeployRequest>>,
) -> ApiResult<Json<Value>> {
    let name = body.and_then(|Json(b)| b.name);
    let outcome = state.deployments.deploy(graph_id, &caller, name)?;
    Ok(Json(json!({
        "success": true,
        "message": outcome.message,
        "version": outcome.version,
        "is_active": outcome.is_active,
        "needs_redeployment": outcome.needs_redeployment,
    })))
}

pub async fn undeploy(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let status = state.deployments.undeploy(graph_id, &caller)?;
    Ok(Json(serde_json::to_value(status).map_err(strand_domain::Error::from)?))
}

pub async fn status(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let status = state.deployments.status(graph_id, &caller)?;
    Ok(Json(serde_json::to_value(status).map_err(strand_domain::Error::from)?))
}

pub async fn list_versions(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let page = state
        .deployments
        .list_versions(graph_id, &caller, query.page, query.page_size)?;
    Ok(Json(serde_json::to_value(page).map_err(strand_domain::Error::from)?))
}

pub async fn get_version(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((graph_id, version)): Path<(Uuid, u32)>,
) -> ApiResult<Json<Value>> {
    let meta = state.deployments.get_version(graph_id, version, &caller)?;
    Ok(Json(serde_json::to_value(meta).map_err(strand_domain::Error::from)?))
}

pub async fn get_version_state(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((graph_id, version)): Path<(Uuid, u32)>,
) -> ApiResult<Json<Value>> {
    let state_view = state
        .deployments
        .get_version_state(graph_id, version, &caller)?;
    Ok(Json(state_view))
}

pub async fn rename_version(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((graph_id, version)): Path<(Uuid, u32)>,
    Json(body): Json<RenameRequest>,
) -> ApiResult<Json<Value>> {
    let meta = state
        .deployments
        .rename_version(graph_id, version, body.name, &caller)?;
    Ok(Json(serde_json::to_value(meta).map_err(strand_domain::Error::from)?))
}

pub async fn activate_version(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((graph_id, version)): Path<(Uuid, u32)>,
) -> ApiResult<Json<Value>> {
    let meta = state
        .deployments
        .activate_version(graph_id, version, &caller)?;
    Ok(Json(serde_json::to_value(meta).map_err(strand_domain::Error::from)?))
}

pub async fn revert_version(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((graph_id, version)): Path<(Uuid, u32)>,
) -> ApiResult<Json<Value>> {
    let reverted = state
        .deployments
        .revert_to_version(graph_id, version, &caller)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Reverted to version {reverted}"),
        "version": reverted,
        "is_active": true,
    })))
}

pub async fn delete_version(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((graph_id, version)): Path<(Uuid, u32)>,
) -> ApiResult<Json<Value>> {
    state.deployments.delete_version(graph_id, version, &caller)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Version {version} deleted"),
    })))
}
