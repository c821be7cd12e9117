//! Tool seam.
//!
//! Tool servers and the underlying protocol live outside the execution
//! core; nodes resolve tools by `(server, name)` through the registry and
//! invoke them with JSON arguments. Backends own their lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use strand_domain::Result;

pub const BUILTIN_SERVER: &str = "builtin";

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, arguments: Value) -> Result<Value>;
}

/// Registry of tools keyed by `(server, name)`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<(String, String), Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, server: &str, tool: Arc<dyn Tool>) {
        self.tools
            .write()
            .insert((server.to_string(), tool.name().to_string()), tool);
    }

    pub fn resolve(&self, server: &str, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .get(&(server.to_string(), name.to_string()))
            .cloned()
    }

    /// Resolve a possibly server-qualified tool name (`server.tool` or a
    /// bare builtin name).
    pub fn resolve_qualified(&self, qualified: &str) -> Option<Arc<dyn Tool>> {
        match qualified.split_once('.') {
            Some((server, name)) => self.resolve(server, name),
            None => self.resolve(BUILTIN_SERVER, qualified),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}
