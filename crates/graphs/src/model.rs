//! Graph, node, and edge records.
//!
//! `data.config` is the authoritative configuration store on a node; the
//! top-level `prompt` and `tools` columns mirror `config.systemPrompt` and
//! `config.tools` for fast queries. Writes keep the mirrors consistent,
//! reads prefer config and fall back to the mirrors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use strand_domain::identity::{Caller, WorkspaceRole};
use strand_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_deployed: bool,
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
    /// Editor concerns (`viewport`) and user-declared context variables
    /// (`context`), plus passthrough keys.
    #[serde(default)]
    pub variables: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Graph {
    pub fn new(name: impl Into<String>, owner_user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_user_id,
            workspace_id: None,
            folder_id: None,
            parent_id: None,
            name: name.into(),
            description: None,
            color: None,
            is_deployed: false,
            deployed_at: None,
            variables: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Read access: superuser, owner, or workspace role at or above
    /// `required` on a workspace graph.
    pub fn ensure_access(&self, caller: &Caller, required: WorkspaceRole) -> Result<()> {
        if caller.is_superuser || caller.user_id == self.owner_user_id {
            return Ok(());
        }
        if self.workspace_id.is_some() {
            if let Some(role) = caller.workspace_role {
                if role.at_least(required) {
                    return Ok(());
                }
            }
        }
        Err(Error::Forbidden("no access to graph".into()))
    }

    /// Deploy access: owner, superuser, or workspace admin.
    pub fn ensure_can_deploy(&self, caller: &Caller) -> Result<()> {
        self.ensure_access(caller, WorkspaceRole::Admin)
            .map_err(|_| Error::Forbidden("only graph owner or workspace admin can deploy".into()))
    }

    /// Declared context variables with `{value: X}` wrappers unwrapped.
    pub fn context_values(&self) -> serde_json::Map<String, Value> {
        let mut out = serde_json::Map::new();
        let Some(context) = self.variables.get("context").and_then(Value::as_object) else {
            return out;
        };
        for (name, raw) in context {
            let value = match raw.get("value") {
                Some(inner) => inner.clone(),
                None => raw.clone(),
            };
            out.insert(name.clone(), value);
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub graph_id: Uuid,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: Position,
    #[serde(default)]
    pub position_absolute: Option<Position>,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    /// Mirror of `data.config.systemPrompt`.
    #[serde(default)]
    pub prompt: String,
    /// Mirror of `data.config.tools`.
    #[serde(default)]
    pub tools: Value,
    #[serde(default)]
    pub memory: Value,
    /// Authoritative node payload; `data.config` holds the configuration.
    #[serde(default)]
    pub data: Value,
}

impl GraphNode {
    /// Re-derive the mirror columns from `data.config`, falling back to the
    /// current mirror values when the config lacks them.
    pub fn sync_mirrors(&mut self) {
        let config = self.data.get("config").cloned().unwrap_or_default();
        if let Some(prompt) = config
            .get("systemPrompt")
            .or_else(|| config.get("prompt"))
            .and_then(Value::as_str)
        {
            self.prompt = prompt.to_string();
        }
        if let Some(tools) = config.get("tools") {
            if !tools.is_null() {
                self.tools = tools.clone();
            }
        } else if let Some(tools) = self.data.get("tools") {
            if !tools.is_null() {
                self.tools = tools.clone();
            }
        }
        if let Some(memory) = self.data.get("memory") {
            if !memory.is_null() {
                self.memory = memory.clone();
            }
        }
    }

    /// Node configuration (`data.config`), or an empty object.
    pub fn config(&self) -> Value {
        self.data
            .get("config")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Edge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How an edge routes execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Normal,
    Conditional,
    LoopBack,
}

impl EdgeKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "conditional" => EdgeKind::Conditional,
            "loop_back" => EdgeKind::LoopBack,
            _ => EdgeKind::Normal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: Uuid,
    pub graph_id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    /// Edge metadata: `edge_type`, `route_key`, `source_handle_id`,
    /// `label`, `condition`, passthrough keys.
    #[serde(default)]
    pub data: Value,
}

impl GraphEdge {
    pub fn kind(&self) -> EdgeKind {
        self.data
            .get("edge_type")
            .and_then(Value::as_str)
            .map(EdgeKind::parse)
            .unwrap_or(EdgeKind::Normal)
    }

    pub fn route_key(&self) -> Option<&str> {
        self.data.get("route_key").and_then(Value::as_str)
    }
}
