//! Deployment snapshot normalization and content hashing.
//!
//! A snapshot fully describes a graph's editable state at deploy time. The
//! hash is computed over canonical JSON (sorted keys, UTF-8) with the
//! `lastSaved` timestamp excluded, truncated to 16 hex chars. It is used
//! only for change detection, never for security.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::{GraphEdge, GraphNode, Position};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub tools: Value,
    #[serde(default)]
    pub memory: Value,
    #[serde(default)]
    pub prompt: String,
    pub position: Position,
    #[serde(default)]
    pub position_absolute: Option<Position>,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: BTreeMap<String, NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    #[serde(default)]
    pub variables: Value,
    #[serde(rename = "lastSaved")]
    pub last_saved: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalize live nodes and edges into the snapshot stored on a
/// deployment version.
///
/// The mirror columns are folded into `data.config` when the config lacks
/// them, so a revert restores everything even for nodes whose schema
/// predates config-as-authoritative.
pub fn normalize_graph_state(nodes: &[GraphNode], edges: &[GraphEdge], variables: &Value) -> Snapshot {
    let mut snapshot_nodes = BTreeMap::new();

    for node in nodes {
        let node_id = node.id.to_string();

        let mut data = match node.data.clone() {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        let config = data
            .entry("config")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(config) = config.as_object_mut() {
            let prompt_missing = config
                .get("systemPrompt")
                .and_then(Value::as_str)
                .map_or(true, str::is_empty);
            if prompt_missing && !node.prompt.is_empty() {
                config.insert("systemPrompt".into(), Value::String(node.prompt.clone()));
            }
            let tools_missing = match config.get("tools") {
                None | Some(Value::Null) => true,
                Some(Value::Object(map)) => map.is_empty(),
                Some(_) => false,
            };
            if tools_missing && node.tools.as_object().is_some_and(|m| !m.is_empty()) {
                config.insert("tools".into(), node.tools.clone());
            }
        }

        snapshot_nodes.insert(
            node_id.clone(),
            NodeSnapshot {
                id: node_id,
                node_type: node.node_type.clone(),
                tools: node.tools.clone(),
                memory: node.memory.clone(),
                prompt: node.prompt.clone(),
                position: node.position,
                position_absolute: node.position_absolute,
                width: node.width,
                height: node.height,
                data: Value::Object(data),
            },
        );
    }

    let snapshot_edges = edges
        .iter()
        .map(|edge| EdgeSnapshot {
            id: edge.id.to_string(),
            source: edge.source_node_id.to_string(),
            target: edge.target_node_id.to_string(),
            data: edge.data.clone(),
        })
        .collect();

    Snapshot {
        nodes: snapshot_nodes,
        edges: snapshot_edges,
        variables: variables.clone(),
        last_saved: Utc::now().timestamp_millis(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Change detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stable 16-hex-char hash over the snapshot with `lastSaved` excluded.
pub fn state_hash(snapshot: &Snapshot) -> String {
    let mut value = serde_json::to_value(snapshot).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.remove("lastSaved");
    }
    // serde_json objects serialize with sorted keys, giving canonical output.
    let canonical = serde_json::to_string(&value).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Two snapshots are equal iff their hashes match.
pub fn has_changed(current: &Snapshot, deployed: &Snapshot) -> bool {
    state_hash(current) != state_hash(deployed)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Restore helpers (revert path)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Prompt to restore for a node: `data.config.systemPrompt` when present,
/// else the top-level mirror (older snapshots stored only the mirrors).
pub fn restored_prompt(node: &NodeSnapshot) -> String {
    node.data
        .get("config")
        .and_then(|c| c.get("systemPrompt"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| node.prompt.clone())
}

/// Tools to restore for a node, same precedence as [`restored_prompt`].
pub fn restored_tools(node: &NodeSnapshot) -> Value {
    let from_config = node
        .data
        .get("config")
        .and_then(|c| c.get("tools"))
        .filter(|t| t.as_object().is_some_and(|m| !m.is_empty()));
    match from_config {
        Some(tools) => tools.clone(),
        None => node.tools.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn sample_node(prompt: &str) -> GraphNode {
        GraphNode {
            id: Uuid::new_v4(),
            graph_id: Uuid::new_v4(),
            node_type: "agent".into(),
            position: Position { x: 10.0, y: 20.0 },
            position_absolute: Some(Position { x: 10.0, y: 20.0 }),
            width: 200.0,
            height: 80.0,
            prompt: prompt.into(),
            tools: json!({"web_search": {"enabled": true}}),
            memory: json!({}),
            data: json!({"config": {}}),
        }
    }

    fn sample_edge(source: Uuid, target: Uuid) -> GraphEdge {
        GraphEdge {
            id: Uuid::new_v4(),
            graph_id: Uuid::new_v4(),
            source_node_id: source,
            target_node_id: target,
            data: json!({"edge_type": "normal"}),
        }
    }

    #[test]
    fn normalize_folds_mirrors_into_config() {
        let node = sample_node("hello");
        let snapshot = normalize_graph_state(&[node], &[], &json!({}));
        let stored = snapshot.nodes.values().next().unwrap();
        assert_eq!(
            stored.data["config"]["systemPrompt"],
            json!("hello"),
            "mirror prompt must be folded into config"
        );
        assert_eq!(stored.data["config"]["tools"]["web_search"]["enabled"], json!(true));
    }

    #[test]
    fn normalize_respects_existing_config() {
        let mut node = sample_node("mirror");
        node.data = json!({"config": {"systemPrompt": "config wins"}});
        let snapshot = normalize_graph_state(&[node], &[], &json!({}));
        let stored = snapshot.nodes.values().next().unwrap();
        assert_eq!(stored.data["config"]["systemPrompt"], json!("config wins"));
    }

    #[test]
    fn hash_ignores_last_saved() {
        let node = sample_node("p");
        let mut a = normalize_graph_state(std::slice::from_ref(&node), &[], &json!({}));
        let mut b = normalize_graph_state(&[node], &[], &json!({}));
        a.last_saved = 1;
        b.last_saved = 999_999;
        assert_eq!(state_hash(&a), state_hash(&b));
        assert!(!has_changed(&a, &b));
    }

    #[test]
    fn hash_detects_prompt_change() {
        let a = normalize_graph_state(&[sample_node("one")], &[], &json!({}));
        let b = normalize_graph_state(&[sample_node("two")], &[], &json!({}));
        // Node ids differ too, but a prompt change alone must also flip the
        // hash for identical ids:
        let mut c = a.clone();
        for node in c.nodes.values_mut() {
            node.prompt = "changed".into();
            node.data["config"]["systemPrompt"] = json!("changed");
        }
        assert!(has_changed(&a, &b));
        assert!(has_changed(&a, &c));
    }

    #[test]
    fn hash_is_16_hex_chars() {
        let snapshot = normalize_graph_state(&[], &[], &json!({}));
        let hash = state_hash(&snapshot);
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn round_trip_hash_stability() {
        // hash(S) == hash(parse(serialize(S))): the revert round-trip must
        // not change what the hash sees.
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let snapshot = normalize_graph_state(
            &[sample_node("alpha")],
            &[sample_edge(source, target)],
            &json!({"context": {"k": {"value": 1}}}),
        );
        let serialized = serde_json::to_string(&snapshot).unwrap();
        let reparsed: Snapshot = serde_json::from_str(&serialized).unwrap();
        assert_eq!(state_hash(&snapshot), state_hash(&reparsed));
    }

    #[test]
    fn restored_mirrors_prefer_config() {
        let mut node_snapshot = NodeSnapshot {
            id: "n".into(),
            node_type: "agent".into(),
            tools: json!({"old": {}}),
            memory: json!({}),
            prompt: "old prompt".into(),
            position: Position::default(),
            position_absolute: None,
            width: 0.0,
            height: 0.0,
            data: json!({"config": {"systemPrompt": "new prompt", "tools": {"new": {}}}}),
        };
        assert_eq!(restored_prompt(&node_snapshot), "new prompt");
        assert_eq!(restored_tools(&node_snapshot), json!({"new": {}}));

        // Older snapshot without config values falls back to the mirrors.
        node_snapshot.data = json!({});
        assert_eq!(restored_prompt(&node_snapshot), "old prompt");
        assert_eq!(restored_tools(&node_snapshot), json!({"old": {}}));
    }
}
