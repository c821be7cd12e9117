//! File-backed graph store.
//!
//! Graph metadata lives in `graphs/graphs.json`; each graph's nodes and
//! edges live in `graphs/state/<graph_id>.json`. Everything is held in
//! memory behind RwLocks and written through atomically (tmp + rename) on
//! mutation, so readers never observe a torn file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use strand_domain::identity::{Caller, WorkspaceRole};
use strand_domain::{Error, Result};

use crate::model::{EdgeKind, Graph, GraphEdge, GraphNode, Position};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests / summaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Editor save payload. Nodes and edges arrive in the canvas shape the
/// frontend uses; ids that parse as UUIDs of existing nodes are updated in
/// place, everything else is created fresh.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveStateRequest {
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub edges: Vec<Value>,
    #[serde(default)]
    pub viewport: Option<Value>,
    #[serde(default)]
    pub variables: Option<Value>,
    /// Upsert: name for a graph created on first save.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub graph_id: Uuid,
    pub nodes_count: usize,
    pub edges_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphState {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GraphStore {
    index_path: PathBuf,
    state_dir: PathBuf,
    graphs: RwLock<HashMap<Uuid, Graph>>,
    states: RwLock<HashMap<Uuid, GraphState>>,
}

impl GraphStore {
    /// Load or create the store under `<state_path>/graphs`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("graphs");
        let state_dir = dir.join("state");
        std::fs::create_dir_all(&state_dir)?;

        let index_path = dir.join("graphs.json");
        let graphs: HashMap<Uuid, Graph> = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        let mut states = HashMap::new();
        for id in graphs.keys() {
            let path = state_dir.join(format!("{id}.json"));
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                match serde_json::from_str::<GraphState>(&raw) {
                    Ok(state) => {
                        states.insert(*id, state);
                    }
                    Err(e) => {
                        tracing::warn!(graph_id = %id, error = %e, "skipping malformed graph state file");
                    }
                }
            }
        }

        tracing::info!(graphs = graphs.len(), path = %index_path.display(), "graph store loaded");

        Ok(Self {
            index_path,
            state_dir,
            graphs: RwLock::new(graphs),
            states: RwLock::new(states),
        })
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn create(&self, graph: Graph) -> Result<Graph> {
        {
            let graphs = self.graphs.read();
            if graphs
                .values()
                .any(|g| g.owner_user_id == graph.owner_user_id && g.name == graph.name)
            {
                return Err(Error::Conflict(format!(
                    "a graph named \"{}\" already exists",
                    graph.name
                )));
            }
        }
        self.graphs.write().insert(graph.id, graph.clone());
        self.flush()?;
        Ok(graph)
    }

    pub fn get(&self, id: Uuid) -> Option<Graph> {
        self.graphs.read().get(&id).cloned()
    }

    pub fn require(&self, id: Uuid) -> Result<Graph> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("graph {id} not found")))
    }

    pub fn list_for(&self, caller: &Caller) -> Vec<Graph> {
        let mut graphs: Vec<Graph> = self
            .graphs
            .read()
            .values()
            .filter(|g| g.ensure_access(caller, WorkspaceRole::Viewer).is_ok())
            .cloned()
            .collect();
        graphs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        graphs
    }

    /// Update graph metadata in place. Returns the updated graph.
    pub fn update<F>(&self, id: Uuid, f: F) -> Result<Graph>
    where
        F: FnOnce(&mut Graph),
    {
        let updated = {
            let mut graphs = self.graphs.write();
            let graph = graphs
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("graph {id} not found")))?;
            f(graph);
            graph.updated_at = Utc::now();
            graph.clone()
        };
        self.flush()?;
        Ok(updated)
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        let removed = self.graphs.write().remove(&id);
        if removed.is_none() {
            return Err(Error::NotFound(format!("graph {id} not found")));
        }
        self.states.write().remove(&id);
        let path = self.state_path_for(id);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(graph_id = %id, error = %e, "failed to remove graph state file");
            }
        }
        self.flush()
    }

    // ── Live state ───────────────────────────────────────────────────

    pub fn nodes_and_edges(&self, id: Uuid) -> (Vec<GraphNode>, Vec<GraphEdge>) {
        let states = self.states.read();
        match states.get(&id) {
            Some(state) => (state.nodes.clone(), state.edges.clone()),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Save the full editor state. Upserts the graph when it does not exist
    /// and a caller is provided.
    pub fn save_state(
        &self,
        graph_id: Uuid,
        request: SaveStateRequest,
        caller: Option<&Caller>,
    ) -> Result<SaveSummary> {
        match self.get(graph_id) {
            Some(graph) => {
                if let Some(caller) = caller {
                    graph.ensure_access(caller, WorkspaceRole::Editor)?;
                }
            }
            None => {
                let caller =
                    caller.ok_or_else(|| Error::NotFound(format!("graph {graph_id} not found")))?;
                let mut graph = Graph::new(
                    request.name.clone().unwrap_or_else(|| "Untitled graph".into()),
                    caller.user_id,
                );
                graph.id = graph_id;
                graph.workspace_id = request.workspace_id;
                self.graphs.write().insert(graph_id, graph);
            }
        }

        // Map frontend node ids to stored node ids: an id that parses as the
        // UUID of an existing node updates it in place, everything else
        // becomes a new node.
        let existing: HashMap<Uuid, GraphNode> = {
            let states = self.states.read();
            states
                .get(&graph_id)
                .map(|s| s.nodes.iter().map(|n| (n.id, n.clone())).collect())
                .unwrap_or_default()
        };

        let mut node_id_map: HashMap<String, Uuid> = HashMap::new();
        let mut nodes = Vec::with_capacity(request.nodes.len());
        for raw in &request.nodes {
            let Some(frontend_id) = raw.get("id").and_then(Value::as_str) else {
                continue;
            };
            let reused = Uuid::parse_str(frontend_id)
                .ok()
                .filter(|id| existing.contains_key(id));
            let node_id = reused.unwrap_or_else(Uuid::new_v4);
            node_id_map.insert(frontend_id.to_string(), node_id);
            nodes.push(parse_canvas_node(node_id, graph_id, raw));
        }

        // Edges: dedupe on (source, target), drop dangling endpoints.
        let mut seen = std::collections::HashSet::new();
        let mut edges = Vec::with_capacity(request.edges.len());
        for raw in &request.edges {
            let (Some(source), Some(target)) = (
                raw.get("source").and_then(Value::as_str),
                raw.get("target").and_then(Value::as_str),
            ) else {
                continue;
            };
            if !seen.insert((source.to_string(), target.to_string())) {
                continue;
            }
            let (Some(&source_id), Some(&target_id)) =
                (node_id_map.get(source), node_id_map.get(target))
            else {
                continue;
            };
            edges.push(GraphEdge {
                id: Uuid::new_v4(),
                graph_id,
                source_node_id: source_id,
                target_node_id: target_id,
                data: raw.get("data").cloned().unwrap_or_else(|| json!({})),
            });
        }

        let summary = SaveSummary {
            graph_id,
            nodes_count: nodes.len(),
            edges_count: edges.len(),
        };

        self.states
            .write()
            .insert(graph_id, GraphState { nodes, edges });
        self.persist_state(graph_id)?;

        // Fold viewport/variables into graph.variables and bump updated_at.
        let viewport = request.viewport.clone();
        let variables = request.variables.clone();
        self.update(graph_id, |g| {
            let mut merged = match g.variables.clone() {
                Value::Object(map) => map,
                _ => Default::default(),
            };
            if let Some(viewport) = viewport {
                merged.insert("viewport".into(), viewport);
            }
            if let Some(Value::Object(vars)) = variables {
                for (k, v) in vars {
                    merged.insert(k, v);
                }
            }
            g.variables = Value::Object(merged);
        })?;

        Ok(summary)
    }

    /// Load the editor state in the canvas shape the frontend renders.
    pub fn load_state(&self, graph_id: Uuid, caller: Option<&Caller>) -> Result<Value> {
        let graph = self.require(graph_id)?;
        if let Some(caller) = caller {
            graph.ensure_access(caller, WorkspaceRole::Viewer)?;
        }
        let (nodes, edges) = self.nodes_and_edges(graph_id);

        let canvas_nodes: Vec<Value> = nodes.iter().map(canvas_node).collect();
        let canvas_edges: Vec<Value> = edges.iter().map(canvas_edge).collect();

        let viewport = graph
            .variables
            .get("viewport")
            .cloned()
            .unwrap_or_else(|| json!({}));

        Ok(json!({
            "nodes": canvas_nodes,
            "edges": canvas_edges,
            "viewport": viewport,
            "variables": graph.variables,
        }))
    }

    /// Replace the live state wholesale, preserving the given node and edge
    /// ids. Used by the deployment revert path.
    pub fn replace_state(
        &self,
        graph_id: Uuid,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
        variables: Value,
    ) -> Result<()> {
        self.require(graph_id)?;
        self.states
            .write()
            .insert(graph_id, GraphState { nodes, edges });
        self.persist_state(graph_id)?;
        self.update(graph_id, |g| {
            g.variables = variables;
        })?;
        Ok(())
    }

    // ── Persistence ──────────────────────────────────────────────────

    pub fn flush(&self) -> Result<()> {
        let graphs = self.graphs.read();
        write_json_atomic(&self.index_path, &*graphs)
    }

    fn persist_state(&self, graph_id: Uuid) -> Result<()> {
        let states = self.states.read();
        let state = states.get(&graph_id).cloned().unwrap_or_default();
        write_json_atomic(&self.state_path_for(graph_id), &state)
    }

    fn state_path_for(&self, graph_id: Uuid) -> PathBuf {
        self.state_dir.join(format!("{graph_id}.json"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Canvas conversion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn point(raw: Option<&Value>) -> Position {
    let get = |axis: &str| {
        raw.and_then(|p| p.get(axis))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    Position {
        x: get("x"),
        y: get("y"),
    }
}

fn parse_canvas_node(node_id: Uuid, graph_id: Uuid, raw: &Value) -> GraphNode {
    let position = point(raw.get("position"));
    let position_absolute = raw
        .get("positionAbsolute")
        .map(|p| point(Some(p)))
        .unwrap_or(position);
    let data = raw.get("data").cloned().unwrap_or_else(|| json!({}));
    // The canvas `type` is the renderer component; the real node type lives
    // in `data.type`.
    let node_type = data
        .get("type")
        .or_else(|| raw.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("agent")
        .to_string();

    let mut node = GraphNode {
        id: node_id,
        graph_id,
        node_type,
        position,
        position_absolute: Some(position_absolute),
        width: raw.get("width").and_then(Value::as_f64).unwrap_or(0.0),
        height: raw.get("height").and_then(Value::as_f64).unwrap_or(0.0),
        prompt: String::new(),
        tools: json!({}),
        memory: json!({}),
        data,
    };
    node.sync_mirrors();
    node
}

fn canvas_node(node: &GraphNode) -> Value {
    let mut data = match node.data.clone() {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    data.entry("type")
        .or_insert_with(|| Value::String(node.node_type.clone()));
    let config = data.entry("config").or_insert_with(|| json!({}));
    if let Some(config) = config.as_object_mut() {
        // Backfill from the mirrors so a revert from an old snapshot still
        // shows complete configuration in the editor.
        let prompt_empty = config
            .get("systemPrompt")
            .and_then(Value::as_str)
            .map_or(true, str::is_empty);
        if prompt_empty && !node.prompt.is_empty() {
            config.insert("systemPrompt".into(), Value::String(node.prompt.clone()));
        }
        let tools_empty = match config.get("tools") {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        };
        if tools_empty && node.tools.as_object().is_some_and(|m| !m.is_empty()) {
            config.insert("tools".into(), node.tools.clone());
        }
    }
    if data.get("memory").map_or(true, Value::is_null)
        && node.memory.as_object().is_some_and(|m| !m.is_empty())
    {
        data.insert("memory".into(), node.memory.clone());
    }

    let position_absolute = node.position_absolute.unwrap_or(node.position);
    json!({
        "id": node.id.to_string(),
        "type": "custom",
        "position": node.position,
        "positionAbsolute": position_absolute,
        "width": node.width,
        "height": node.height,
        "data": Value::Object(data),
        "selected": false,
        "dragging": false,
    })
}

fn canvas_edge(edge: &GraphEdge) -> Value {
    let (style, canvas_type) = match edge.kind() {
        EdgeKind::LoopBack => (
            json!({"stroke": "#9333ea", "strokeWidth": 2.5, "strokeDasharray": "5,5"}),
            "loop_back",
        ),
        EdgeKind::Conditional => (json!({"stroke": "#3b82f6", "strokeWidth": 2}), "default"),
        EdgeKind::Normal => (json!({"stroke": "#cbd5e1", "strokeWidth": 1.5}), "default"),
    };
    let source = edge.source_node_id.to_string();
    let target = edge.target_node_id.to_string();
    json!({
        "id": format!("edge-{source}-{target}"),
        "source": source,
        "target": target,
        "sourceHandle": null,
        "targetHandle": null,
        "type": canvas_type,
        "animated": true,
        "style": style,
        "data": edge.data,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Atomic JSON write
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let raw = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, raw)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, GraphStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn canvas_node_payload(id: &str, prompt: &str) -> Value {
        json!({
            "id": id,
            "type": "custom",
            "position": {"x": 1.0, "y": 2.0},
            "width": 200.0,
            "height": 90.0,
            "data": {"type": "agent", "config": {"systemPrompt": prompt}}
        })
    }

    #[test]
    fn create_get_delete() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let graph = store.create(Graph::new("mine", owner)).unwrap();
        assert!(store.get(graph.id).is_some());

        store.delete(graph.id).unwrap();
        assert!(store.get(graph.id).is_none());
        assert!(matches!(store.delete(graph.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn duplicate_name_for_same_owner_conflicts() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        store.create(Graph::new("dup", owner)).unwrap();
        assert!(matches!(
            store.create(Graph::new("dup", owner)),
            Err(Error::Conflict(_))
        ));
        // Different owner is fine.
        store.create(Graph::new("dup", Uuid::new_v4())).unwrap();
    }

    #[test]
    fn save_state_creates_nodes_with_mirrors() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let graph = store.create(Graph::new("g", owner)).unwrap();

        let request = SaveStateRequest {
            nodes: vec![canvas_node_payload("node_1", "be helpful")],
            edges: vec![],
            viewport: Some(json!({"x": 0, "y": 0, "zoom": 1})),
            ..Default::default()
        };
        let summary = store
            .save_state(graph.id, request, Some(&Caller::user(owner)))
            .unwrap();
        assert_eq!(summary.nodes_count, 1);

        let (nodes, _) = store.nodes_and_edges(graph.id);
        assert_eq!(nodes[0].prompt, "be helpful");
        assert_eq!(nodes[0].node_type, "agent");

        let updated = store.get(graph.id).unwrap();
        assert_eq!(updated.variables["viewport"]["zoom"], json!(1));
    }

    #[test]
    fn save_state_preserves_existing_node_ids() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let caller = Caller::user(owner);
        let graph = store.create(Graph::new("g", owner)).unwrap();

        store
            .save_state(
                graph.id,
                SaveStateRequest {
                    nodes: vec![canvas_node_payload("node_1", "v1")],
                    ..Default::default()
                },
                Some(&caller),
            )
            .unwrap();
        let (nodes, _) = store.nodes_and_edges(graph.id);
        let stable_id = nodes[0].id;

        // Re-save using the stored UUID as the canvas id: same node updated.
        store
            .save_state(
                graph.id,
                SaveStateRequest {
                    nodes: vec![canvas_node_payload(&stable_id.to_string(), "v2")],
                    ..Default::default()
                },
                Some(&caller),
            )
            .unwrap();
        let (nodes, _) = store.nodes_and_edges(graph.id);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, stable_id);
        assert_eq!(nodes[0].prompt, "v2");
    }

    #[test]
    fn save_state_dedupes_edges() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let graph = store.create(Graph::new("g", owner)).unwrap();

        let request = SaveStateRequest {
            nodes: vec![
                canvas_node_payload("a", "pa"),
                canvas_node_payload("b", "pb"),
            ],
            edges: vec![
                json!({"source": "a", "target": "b"}),
                json!({"source": "a", "target": "b"}),
                json!({"source": "a", "target": "ghost"}),
            ],
            ..Default::default()
        };
        let summary = store
            .save_state(graph.id, request, Some(&Caller::user(owner)))
            .unwrap();
        assert_eq!(summary.edges_count, 1);
    }

    #[test]
    fn save_state_upserts_missing_graph() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let graph_id = Uuid::new_v4();

        let summary = store
            .save_state(
                graph_id,
                SaveStateRequest {
                    nodes: vec![canvas_node_payload("n", "p")],
                    name: Some("from save".into()),
                    ..Default::default()
                },
                Some(&Caller::user(owner)),
            )
            .unwrap();
        assert_eq!(summary.graph_id, graph_id);
        assert_eq!(store.get(graph_id).unwrap().name, "from save");
    }

    #[test]
    fn save_state_without_caller_on_missing_graph_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.save_state(Uuid::new_v4(), SaveStateRequest::default(), None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn load_state_backfills_config_from_mirrors() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let graph = store.create(Graph::new("g", owner)).unwrap();

        // A node whose config is empty but whose mirrors are populated
        // (e.g. restored from an old deployment snapshot).
        let node = GraphNode {
            id: Uuid::new_v4(),
            graph_id: graph.id,
            node_type: "agent".into(),
            position: Position { x: 0.0, y: 0.0 },
            position_absolute: None,
            width: 0.0,
            height: 0.0,
            prompt: "mirrored".into(),
            tools: json!({"search": {}}),
            memory: json!({}),
            data: json!({"config": {}}),
        };
        store
            .replace_state(graph.id, vec![node], vec![], json!({}))
            .unwrap();

        let state = store.load_state(graph.id, None).unwrap();
        assert_eq!(
            state["nodes"][0]["data"]["config"]["systemPrompt"],
            json!("mirrored")
        );
        assert_eq!(
            state["nodes"][0]["data"]["config"]["tools"],
            json!({"search": {}})
        );
    }

    #[test]
    fn load_state_styles_edges_by_kind() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let graph = store.create(Graph::new("g", owner)).unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mk_node = |id: Uuid| GraphNode {
            id,
            graph_id: graph.id,
            node_type: "agent".into(),
            position: Position::default(),
            position_absolute: None,
            width: 0.0,
            height: 0.0,
            prompt: String::new(),
            tools: json!({}),
            memory: json!({}),
            data: json!({}),
        };
        let edge = GraphEdge {
            id: Uuid::new_v4(),
            graph_id: graph.id,
            source_node_id: a,
            target_node_id: b,
            data: json!({"edge_type": "loop_back"}),
        };
        store
            .replace_state(graph.id, vec![mk_node(a), mk_node(b)], vec![edge], json!({}))
            .unwrap();

        let state = store.load_state(graph.id, None).unwrap();
        assert_eq!(state["edges"][0]["type"], json!("loop_back"));
        assert_eq!(state["edges"][0]["style"]["strokeDasharray"], json!("5,5"));
    }

    #[test]
    fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let owner = Uuid::new_v4();
        let graph_id;
        {
            let store = GraphStore::new(dir.path()).unwrap();
            let graph = store.create(Graph::new("persisted", owner)).unwrap();
            graph_id = graph.id;
            store
                .save_state(
                    graph.id,
                    SaveStateRequest {
                        nodes: vec![canvas_node_payload("n", "still here")],
                        ..Default::default()
                    },
                    Some(&Caller::user(owner)),
                )
                .unwrap();
        }
        let store = GraphStore::new(dir.path()).unwrap();
        assert_eq!(store.get(graph_id).unwrap().name, "persisted");
        let (nodes, _) = store.nodes_and_edges(graph_id);
        assert_eq!(nodes[0].prompt, "still here");
    }
}
