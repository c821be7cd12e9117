//! Graph editor endpoints.
//!
//! - `POST /v1/graphs`                — create a graph
//! - `GET  /v1/graphs`                — list accessible graphs
//! - `GET  /v1/graphs/:id`            — metadata + canvas state
//! - `DELETE /v1/graphs/:id`          — delete (cascades versions)
//! - `PUT  /v1/graphs/:id/state`      — save canvas state (upsert)
//! - `GET  /v1/graphs/:id/state`      — load canvas state

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use strand_domain::identity::WorkspaceRole;
use strand_domain::Error;
use strand_graphs::model::Graph;
use strand_graphs::store::SaveStateRequest;

use crate::api::auth::CallerIdentity;
use crate::api::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGraphRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
    #[serde(default)]
    pub variables: Option<Value>,
}

pub async fn create_graph(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Json(body): Json<CreateGraphRequest>,
) -> ApiResult<Json<Graph>> {
    if body.name.trim().is_empty() {
        return Err(Error::Validation("graph name must not be empty".into()).into());
    }
    let mut graph = Graph::new(body.name, caller.user_id);
    graph.description = body.description;
    graph.color = body.color;
    graph.workspace_id = body.workspace_id;
    if let Some(variables) = body.variables {
        graph.variables = variables;
    }
    let graph = state.graphs.create(graph)?;
    Ok(Json(graph))
}

pub async fn list_graphs(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> Json<Value> {
    let graphs = state.graphs.list_for(&caller);
    Json(json!({ "graphs": graphs, "count": graphs.len() }))
}

pub async fn get_graph(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let graph = state.graphs.require(graph_id)?;
    graph.ensure_access(&caller, WorkspaceRole::Viewer)?;
    let graph_state = state.graphs.load_state(graph_id, Some(&caller))?;

    let mut detail = serde_json::to_value(&graph).map_err(Error::from)?;
    if let (Some(detail), Some(graph_state)) = (detail.as_object_mut(), graph_state.as_object()) {
        for (key, value) in graph_state {
            detail.insert(key.clone(), value.clone());
        }
    }
    Ok(Json(detail))
}

pub async fn delete_graph(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let graph = state.graphs.require(graph_id)?;
    graph.ensure_can_deploy(&caller)?;
    state.graphs.delete(graph_id)?;
    state.versions.delete_all(graph_id)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn save_state(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
    Json(body): Json<SaveStateRequest>,
) -> ApiResult<Json<Value>> {
    let summary = state.graphs.save_state(graph_id, body, Some(&caller))?;
    Ok(Json(json!({
        "success": true,
        "graph_id": summary.graph_id,
        "nodes_count": summary.nodes_count,
        "edges_count": summary.edges_count,
    })))
}

pub async fn get_state(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(graph_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let canvas = state.graphs.load_state(graph_id, Some(&caller))?;
    Ok(Json(canvas))
}
