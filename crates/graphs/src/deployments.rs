//! Deployment versions: immutable, content-hashed snapshots of a graph.
//!
//! At most one version per graph is active. Versions are numbered densely
//! from 1. Deploying with no changes is a no-op that returns the active
//! version; revert destructively rewrites the live graph from a snapshot,
//! preserving original node and edge ids.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use strand_domain::identity::{Caller, WorkspaceRole};
use strand_domain::{Error, Result};

use crate::model::{Graph, GraphEdge, GraphNode};
use crate::snapshot::{
    has_changed, normalize_graph_state, restored_prompt, restored_tools, state_hash, Snapshot,
};
use crate::store::{write_json_atomic, GraphStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Version record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentVersion {
    pub id: Uuid,
    pub graph_id: Uuid,
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub is_active: bool,
    pub state: Snapshot,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

/// Version metadata without the (potentially large) state payload.
#[derive(Debug, Clone, Serialize)]
pub struct VersionMeta {
    pub id: Uuid,
    pub version: u32,
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl From<&DeploymentVersion> for VersionMeta {
    fn from(v: &DeploymentVersion) -> Self {
        Self {
            id: v.id,
            version: v.version,
            name: v.name.clone(),
            is_active: v.is_active,
            created_at: v.created_at,
            created_by: v.created_by,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Version store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File-backed per-graph version lists (`graphs/deployments/<graph_id>.json`).
pub struct VersionStore {
    dir: PathBuf,
    versions: RwLock<HashMap<Uuid, Vec<DeploymentVersion>>>,
}

impl VersionStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("graphs").join("deployments");
        std::fs::create_dir_all(&dir)?;

        let mut versions: HashMap<Uuid, Vec<DeploymentVersion>> = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(graph_id) = Uuid::parse_str(stem) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Vec<DeploymentVersion>>(&raw) {
                Ok(list) => {
                    versions.insert(graph_id, list);
                }
                Err(e) => {
                    tracing::warn!(graph_id = %graph_id, error = %e, "skipping malformed deployment file");
                }
            }
        }

        tracing::info!(graphs = versions.len(), "deployment version store loaded");
        Ok(Self {
            dir,
            versions: RwLock::new(versions),
        })
    }

    pub fn active(&self, graph_id: Uuid) -> Option<DeploymentVersion> {
        self.versions
            .read()
            .get(&graph_id)
            .and_then(|list| list.iter().find(|v| v.is_active).cloned())
    }

    pub fn get(&self, graph_id: Uuid, version: u32) -> Option<DeploymentVersion> {
        self.versions
            .read()
            .get(&graph_id)
            .and_then(|list| list.iter().find(|v| v.version == version).cloned())
    }

    /// All versions of a graph, newest first.
    pub fn list(&self, graph_id: Uuid) -> Vec<DeploymentVersion> {
        let mut list = self
            .versions
            .read()
            .get(&graph_id)
            .cloned()
            .unwrap_or_default();
        list.sort_by(|a, b| b.version.cmp(&a.version));
        list
    }

    /// Create the next version (`max + 1`) and make it active.
    pub fn create(
        &self,
        graph_id: Uuid,
        state: Snapshot,
        created_by: Uuid,
        name: Option<String>,
    ) -> Result<DeploymentVersion> {
        let created = {
            let mut versions = self.versions.write();
            let list = versions.entry(graph_id).or_default();
            let next = list.iter().map(|v| v.version).max().unwrap_or(0) + 1;
            for v in list.iter_mut() {
                v.is_active = false;
            }
            let version = DeploymentVersion {
                id: Uuid::new_v4(),
                graph_id,
                version: next,
                name,
                is_active: true,
                state,
                created_at: Utc::now(),
                created_by,
            };
            list.push(version.clone());
            version
        };
        self.persist(graph_id)?;
        Ok(created)
    }

    /// Deactivate all other versions and activate the given one.
    pub fn activate(&self, graph_id: Uuid, version: u32) -> Result<Option<DeploymentVersion>> {
        let activated = {
            let mut versions = self.versions.write();
            let Some(list) = versions.get_mut(&graph_id) else {
                return Ok(None);
            };
            if !list.iter().any(|v| v.version == version) {
                return Ok(None);
            }
            let mut activated = None;
            for v in list.iter_mut() {
                v.is_active = v.version == version;
                if v.is_active {
                    activated = Some(v.clone());
                }
            }
            activated
        };
        self.persist(graph_id)?;
        Ok(activated)
    }

    /// Deactivate whichever version is active. Returns whether one was.
    pub fn deactivate_all(&self, graph_id: Uuid) -> Result<bool> {
        let had_active = {
            let mut versions = self.versions.write();
            let Some(list) = versions.get_mut(&graph_id) else {
                return Ok(false);
            };
            let mut had = false;
            for v in list.iter_mut() {
                had |= v.is_active;
                v.is_active = false;
            }
            had
        };
        if had_active {
            self.persist(graph_id)?;
        }
        Ok(had_active)
    }

    pub fn rename(
        &self,
        graph_id: Uuid,
        version: u32,
        name: String,
    ) -> Result<Option<DeploymentVersion>> {
        let renamed = {
            let mut versions = self.versions.write();
            let Some(list) = versions.get_mut(&graph_id) else {
                return Ok(None);
            };
            let Some(v) = list.iter_mut().find(|v| v.version == version) else {
                return Ok(None);
            };
            v.name = Some(name);
            Some(v.clone())
        };
        self.persist(graph_id)?;
        Ok(renamed)
    }

    pub fn delete(&self, graph_id: Uuid, version: u32) -> Result<bool> {
        let removed = {
            let mut versions = self.versions.write();
            let Some(list) = versions.get_mut(&graph_id) else {
                return Ok(false);
            };
            let before = list.len();
            list.retain(|v| v.version != version);
            list.len() != before
        };
        if removed {
            self.persist(graph_id)?;
        }
        Ok(removed)
    }

    /// Drop every version of a graph (graph deletion cascade).
    pub fn delete_all(&self, graph_id: Uuid) -> Result<()> {
        self.versions.write().remove(&graph_id);
        let path = self.path_for(graph_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn persist(&self, graph_id: Uuid) -> Result<()> {
        let versions = self.versions.read();
        let list = versions.get(&graph_id).cloned().unwrap_or_default();
        write_json_atomic(&self.path_for(graph_id), &list)
    }

    fn path_for(&self, graph_id: Uuid) -> PathBuf {
        self.dir.join(format!("{graph_id}.json"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub version: u32,
    pub is_active: bool,
    pub needs_redeployment: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatus {
    pub is_deployed: bool,
    pub deployed_at: Option<DateTime<Utc>>,
    pub active_version: Option<VersionMeta>,
    pub needs_redeployment: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionPage {
    pub versions: Vec<VersionMeta>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DeploymentService {
    graphs: Arc<GraphStore>,
    versions: Arc<VersionStore>,
}

impl DeploymentService {
    pub fn new(graphs: Arc<GraphStore>, versions: Arc<VersionStore>) -> Self {
        Self { graphs, versions }
    }

    fn current_snapshot(&self, graph: &Graph) -> Snapshot {
        let (nodes, edges) = self.graphs.nodes_and_edges(graph.id);
        normalize_graph_state(&nodes, &edges, &graph.variables)
    }

    /// Snapshot the live graph into a new active version, unless nothing
    /// changed since the active version (then the existing one is returned).
    pub fn deploy(&self, graph_id: Uuid, caller: &Caller, name: Option<String>) -> Result<DeployOutcome> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_can_deploy(caller)?;

        let current = self.current_snapshot(&graph);
        let active = self.versions.active(graph_id);

        if let Some(active) = &active {
            if graph.is_deployed && !has_changed(&current, &active.state) {
                return Ok(DeployOutcome {
                    version: active.version,
                    is_active: active.is_active,
                    needs_redeployment: false,
                    message: format!(
                        "No changes detected, current version is v{}",
                        active.version
                    ),
                });
            }
        }

        let created = self
            .versions
            .create(graph_id, current, caller.user_id, name)?;
        self.graphs.update(graph_id, |g| {
            g.is_deployed = true;
            g.deployed_at = Some(Utc::now());
        })?;

        tracing::info!(graph_id = %graph_id, version = created.version, "graph deployed");
        Ok(DeployOutcome {
            version: created.version,
            is_active: true,
            needs_redeployment: false,
            message: format!("Deployed as version {}", created.version),
        })
    }

    /// Take the graph offline. Versions are kept; the active one is
    /// deactivated so deployed-ness and active-version stay in lockstep.
    pub fn undeploy(&self, graph_id: Uuid, caller: &Caller) -> Result<DeploymentStatus> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_can_deploy(caller)?;

        self.versions.deactivate_all(graph_id)?;
        self.graphs.update(graph_id, |g| {
            g.is_deployed = false;
            g.deployed_at = None;
        })?;

        self.status(graph_id, caller)
    }

    pub fn status(&self, graph_id: Uuid, caller: &Caller) -> Result<DeploymentStatus> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_access(caller, WorkspaceRole::Viewer)?;

        let active = self.versions.active(graph_id);
        let needs_redeployment = match &active {
            Some(active) => {
                let current = self.current_snapshot(&graph);
                has_changed(&current, &active.state)
            }
            None => true,
        };

        Ok(DeploymentStatus {
            is_deployed: graph.is_deployed,
            deployed_at: graph.deployed_at,
            active_version: active.as_ref().map(VersionMeta::from),
            needs_redeployment,
        })
    }

    pub fn list_versions(
        &self,
        graph_id: Uuid,
        caller: &Caller,
        page: usize,
        page_size: usize,
    ) -> Result<VersionPage> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_access(caller, WorkspaceRole::Viewer)?;

        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let all = self.versions.list(graph_id);
        let total = all.len();
        let total_pages = total.div_ceil(page_size).max(1);
        let versions = all
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .map(VersionMeta::from)
            .collect();

        Ok(VersionPage {
            versions,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    pub fn get_version(&self, graph_id: Uuid, version: u32, caller: &Caller) -> Result<VersionMeta> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_access(caller, WorkspaceRole::Viewer)?;
        self.versions
            .get(graph_id, version)
            .map(|v| VersionMeta::from(&v))
            .ok_or_else(|| Error::NotFound("deployment version not found".into()))
    }

    /// Full version state translated into the canvas preview shape.
    pub fn get_version_state(&self, graph_id: Uuid, version: u32, caller: &Caller) -> Result<Value> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_access(caller, WorkspaceRole::Viewer)?;
        let v = self
            .versions
            .get(graph_id, version)
            .ok_or_else(|| Error::NotFound("deployment version not found".into()))?;

        let nodes: Vec<Value> = v
            .state
            .nodes
            .values()
            .map(|node| {
                let position_absolute = node.position_absolute.unwrap_or(node.position);
                json!({
                    "id": node.id,
                    "type": "custom",
                    "position": node.position,
                    "positionAbsolute": position_absolute,
                    "width": node.width,
                    "height": node.height,
                    "data": node.data,
                    "selected": false,
                    "dragging": false,
                })
            })
            .collect();

        let edges: Vec<Value> = v
            .state
            .edges
            .iter()
            .map(|edge| {
                json!({
                    "id": edge.id,
                    "source": edge.source,
                    "target": edge.target,
                    "animated": true,
                    "style": {"stroke": "#cbd5e1", "strokeWidth": 1.5},
                })
            })
            .collect();

        Ok(json!({
            "id": v.id.to_string(),
            "version": v.version,
            "name": v.name,
            "is_active": v.is_active,
            "created_at": v.created_at,
            "created_by": v.created_by.to_string(),
            "state": {
                "nodes": nodes,
                "edges": edges,
                "variables": v.state.variables,
            },
        }))
    }

    pub fn rename_version(
        &self,
        graph_id: Uuid,
        version: u32,
        name: String,
        caller: &Caller,
    ) -> Result<VersionMeta> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_access(caller, WorkspaceRole::Viewer)?;
        self.versions
            .rename(graph_id, version, name)?
            .map(|v| VersionMeta::from(&v))
            .ok_or_else(|| Error::NotFound("deployment version not found".into()))
    }

    /// Activate a version without touching the live nodes/edges.
    pub fn activate_version(
        &self,
        graph_id: Uuid,
        version: u32,
        caller: &Caller,
    ) -> Result<VersionMeta> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_can_deploy(caller)?;

        let activated = self
            .versions
            .activate(graph_id, version)?
            .ok_or_else(|| Error::NotFound("deployment version not found".into()))?;

        self.graphs.update(graph_id, |g| {
            g.is_deployed = true;
            g.deployed_at = Some(Utc::now());
        })?;

        Ok(VersionMeta::from(&activated))
    }

    /// Destructive: rewrite the live graph from a version's snapshot,
    /// preserving original node and edge ids, then activate that version.
    pub fn revert_to_version(&self, graph_id: Uuid, version: u32, caller: &Caller) -> Result<u32> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_can_deploy(caller)?;

        let target = self
            .versions
            .get(graph_id, version)
            .ok_or_else(|| Error::NotFound("deployment version not found".into()))?;

        let mut nodes = Vec::with_capacity(target.state.nodes.len());
        for (node_id, node) in &target.state.nodes {
            let id = Uuid::parse_str(node_id)
                .map_err(|_| Error::Validation(format!("version state has invalid node id {node_id}")))?;
            nodes.push(GraphNode {
                id,
                graph_id,
                node_type: node.node_type.clone(),
                position: node.position,
                position_absolute: node.position_absolute,
                width: node.width,
                height: node.height,
                prompt: restored_prompt(node),
                tools: restored_tools(node),
                memory: node.memory.clone(),
                data: node.data.clone(),
            });
        }

        let mut edges = Vec::with_capacity(target.state.edges.len());
        for edge in &target.state.edges {
            let parse = |raw: &str| {
                Uuid::parse_str(raw)
                    .map_err(|_| Error::Validation(format!("version state has invalid edge ref {raw}")))
            };
            edges.push(GraphEdge {
                id: parse(&edge.id)?,
                graph_id,
                source_node_id: parse(&edge.source)?,
                target_node_id: parse(&edge.target)?,
                data: edge.data.clone(),
            });
        }

        self.graphs
            .replace_state(graph_id, nodes, edges, target.state.variables.clone())?;
        self.versions.activate(graph_id, version)?;
        self.graphs.update(graph_id, |g| {
            g.is_deployed = true;
            g.deployed_at = Some(Utc::now());
        })?;

        tracing::info!(graph_id = %graph_id, version, "graph reverted to version");
        Ok(version)
    }

    /// Deleting the active version is forbidden.
    pub fn delete_version(&self, graph_id: Uuid, version: u32, caller: &Caller) -> Result<()> {
        let graph = self.graphs.require(graph_id)?;
        graph.ensure_can_deploy(caller)?;

        let target = self
            .versions
            .get(graph_id, version)
            .ok_or_else(|| Error::NotFound("deployment version not found".into()))?;
        if target.is_active {
            return Err(Error::Forbidden(
                "cannot delete the active deployment version".into(),
            ));
        }

        self.versions.delete(graph_id, version)?;
        Ok(())
    }

    /// Current live-state hash, exposed for diagnostics.
    pub fn live_hash(&self, graph_id: Uuid) -> Result<String> {
        let graph = self.graphs.require(graph_id)?;
        Ok(state_hash(&self.current_snapshot(&graph)))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SaveStateRequest;

    struct Fixture {
        _dir: tempfile::TempDir,
        graphs: Arc<GraphStore>,
        service: DeploymentService,
        owner: Caller,
        graph_id: Uuid,
    }

    fn node_payload(id: &str, prompt: &str) -> Value {
        json!({
            "id": id,
            "position": {"x": 0.0, "y": 0.0},
            "data": {"type": "agent", "config": {"systemPrompt": prompt}}
        })
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let graphs = Arc::new(GraphStore::new(dir.path()).unwrap());
        let versions = Arc::new(VersionStore::new(dir.path()).unwrap());
        let service = DeploymentService::new(graphs.clone(), versions);

        let owner_id = Uuid::new_v4();
        let owner = Caller::user(owner_id);
        let graph = graphs.create(Graph::new("g", owner_id)).unwrap();
        graphs
            .save_state(
                graph.id,
                SaveStateRequest {
                    nodes: vec![node_payload("n1", "original prompt")],
                    ..Default::default()
                },
                Some(&owner),
            )
            .unwrap();

        Fixture {
            _dir: dir,
            graphs,
            service,
            owner,
            graph_id: graph.id,
        }
    }

    fn edit_prompt(f: &Fixture, prompt: &str) {
        let (nodes, _) = f.graphs.nodes_and_edges(f.graph_id);
        let id = nodes[0].id.to_string();
        f.graphs
            .save_state(
                f.graph_id,
                SaveStateRequest {
                    nodes: vec![node_payload(&id, prompt)],
                    ..Default::default()
                },
                Some(&f.owner),
            )
            .unwrap();
    }

    #[test]
    fn first_deploy_creates_version_one() {
        let f = fixture();
        let outcome = f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        assert_eq!(outcome.version, 1);
        assert!(outcome.is_active);
        assert!(f.graphs.get(f.graph_id).unwrap().is_deployed);
    }

    #[test]
    fn unchanged_deploy_is_a_noop() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        let again = f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        assert_eq!(again.version, 1);
        assert!(again.message.contains("No changes"));
        assert_eq!(f.service.list_versions(f.graph_id, &f.owner, 1, 10).unwrap().total, 1);
    }

    #[test]
    fn edit_then_deploy_creates_version_two() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();

        // Status before edit: clean.
        let status = f.service.status(f.graph_id, &f.owner).unwrap();
        assert!(!status.needs_redeployment);

        edit_prompt(&f, "edited prompt");
        let status = f.service.status(f.graph_id, &f.owner).unwrap();
        assert!(status.needs_redeployment);

        let outcome = f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        assert_eq!(outcome.version, 2);

        // Version 1 is no longer active; invariant: exactly one active.
        let page = f.service.list_versions(f.graph_id, &f.owner, 1, 10).unwrap();
        let active: Vec<_> = page.versions.iter().filter(|v| v.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version, 2);
    }

    #[test]
    fn revert_restores_prompt_and_keeps_later_version() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        edit_prompt(&f, "edited prompt");
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();

        let (nodes_before, _) = f.graphs.nodes_and_edges(f.graph_id);
        let original_id = nodes_before[0].id;

        let reverted = f.service.revert_to_version(f.graph_id, 1, &f.owner).unwrap();
        assert_eq!(reverted, 1);

        let (nodes, _) = f.graphs.nodes_and_edges(f.graph_id);
        assert_eq!(nodes[0].prompt, "original prompt");
        assert_eq!(nodes[0].id, original_id, "revert must preserve original ids");

        let page = f.service.list_versions(f.graph_id, &f.owner, 1, 10).unwrap();
        assert_eq!(page.total, 2, "revert must not delete later versions");
        let active: Vec<_> = page.versions.iter().filter(|v| v.is_active).collect();
        assert_eq!(active[0].version, 1);
    }

    #[test]
    fn revert_round_trip_is_hash_stable() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        let hash_before = f.service.live_hash(f.graph_id).unwrap();

        edit_prompt(&f, "temporary");
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        f.service.revert_to_version(f.graph_id, 1, &f.owner).unwrap();

        let hash_after = f.service.live_hash(f.graph_id).unwrap();
        assert_eq!(hash_before, hash_after);
        // And the reverted live state no longer needs redeployment.
        let status = f.service.status(f.graph_id, &f.owner).unwrap();
        assert!(!status.needs_redeployment);
    }

    #[test]
    fn delete_active_version_is_forbidden() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        assert!(matches!(
            f.service.delete_version(f.graph_id, 1, &f.owner),
            Err(Error::Forbidden(_))
        ));

        edit_prompt(&f, "v2");
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        // Version 1 is inactive now and may be deleted.
        f.service.delete_version(f.graph_id, 1, &f.owner).unwrap();
        assert!(matches!(
            f.service.get_version(f.graph_id, 1, &f.owner),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn undeploy_clears_deployed_and_active() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        let status = f.service.undeploy(f.graph_id, &f.owner).unwrap();
        assert!(!status.is_deployed);
        assert!(status.active_version.is_none());
        assert!(status.needs_redeployment);

        let graph = f.graphs.get(f.graph_id).unwrap();
        assert!(!graph.is_deployed);
        assert!(graph.deployed_at.is_none());
    }

    #[test]
    fn activate_switches_without_touching_live_state() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        edit_prompt(&f, "live edit");
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();

        let meta = f.service.activate_version(f.graph_id, 1, &f.owner).unwrap();
        assert!(meta.is_active);
        assert_eq!(meta.version, 1);

        // Live state still shows the edit; activation never rewrites it.
        let (nodes, _) = f.graphs.nodes_and_edges(f.graph_id);
        assert_eq!(nodes[0].prompt, "live edit");
    }

    #[test]
    fn version_state_is_canvas_shaped() {
        let f = fixture();
        f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        let state = f.service.get_version_state(f.graph_id, 1, &f.owner).unwrap();
        assert_eq!(state["version"], json!(1));
        assert_eq!(state["state"]["nodes"][0]["type"], json!("custom"));
        assert_eq!(state["state"]["nodes"][0]["selected"], json!(false));
    }

    #[test]
    fn deploy_requires_deploy_permission() {
        let f = fixture();
        let viewer = Caller::user(Uuid::new_v4()).with_role(WorkspaceRole::Viewer);
        // Attach the graph to a workspace so role checks apply.
        f.graphs
            .update(f.graph_id, |g| g.workspace_id = Some(Uuid::new_v4()))
            .unwrap();
        assert!(matches!(
            f.service.deploy(f.graph_id, &viewer, None),
            Err(Error::Forbidden(_))
        ));
        assert!(f.service.status(f.graph_id, &viewer).is_ok());
    }

    #[test]
    fn pagination_is_version_desc() {
        let f = fixture();
        for i in 0..5 {
            edit_prompt(&f, &format!("p{i}"));
            f.service.deploy(f.graph_id, &f.owner, None).unwrap();
        }
        let page = f.service.list_versions(f.graph_id, &f.owner, 1, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.versions[0].version, 5);
        assert_eq!(page.versions[1].version, 4);

        let page3 = f.service.list_versions(f.graph_id, &f.owner, 3, 2).unwrap();
        assert_eq!(page3.versions.len(), 1);
        assert_eq!(page3.versions[0].version, 1);
    }

    #[test]
    fn versions_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let owner_id = Uuid::new_v4();
        let owner = Caller::user(owner_id);
        let graph_id;
        {
            let graphs = Arc::new(GraphStore::new(dir.path()).unwrap());
            let versions = Arc::new(VersionStore::new(dir.path()).unwrap());
            let service = DeploymentService::new(graphs.clone(), versions);
            let graph = graphs.create(Graph::new("g", owner_id)).unwrap();
            graph_id = graph.id;
            graphs
                .save_state(
                    graph.id,
                    SaveStateRequest {
                        nodes: vec![node_payload("n", "p")],
                        ..Default::default()
                    },
                    Some(&owner),
                )
                .unwrap();
            service.deploy(graph_id, &owner, Some("first".into())).unwrap();
        }
        let versions = VersionStore::new(dir.path()).unwrap();
        let active = versions.active(graph_id).unwrap();
        assert_eq!(active.version, 1);
        assert_eq!(active.name.as_deref(), Some("first"));
    }
}
