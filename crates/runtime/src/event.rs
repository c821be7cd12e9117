//! Runtime event taxonomy.
//!
//! The runtime emits heterogeneous events distinguished by a string kind.
//! The stream engine handles the closed set below; anything else arrives as
//! [`RuntimeEventKind::Other`] and is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use strand_domain::llm::RunMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeEventKind {
    ChatModelStart,
    ChatModelStream,
    ChatModelEnd,
    ToolStart,
    ToolEnd,
    ChainStart,
    ChainEnd,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    /// The graph node this event is scoped to, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Token delta for `chat_model_stream`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    /// Full message list, attached to a node's `chain_end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<RunMessage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    #[serde(rename = "event")]
    pub kind: RuntimeEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub metadata: EventMetadata,
    #[serde(default)]
    pub data: EventData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl RuntimeEvent {
    pub fn new(kind: RuntimeEventKind) -> Self {
        Self {
            kind,
            name: None,
            run_id: None,
            metadata: EventMetadata::default(),
            data: EventData::default(),
            tags: Vec::new(),
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.metadata.node = Some(node.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_chunk(mut self, chunk: impl Into<String>) -> Self {
        self.data.chunk = Some(chunk.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.data.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.data.output = Some(output);
        self
    }

    pub fn with_messages(mut self, messages: Vec<RunMessage>) -> Self {
        self.data.messages = Some(messages);
        self
    }

    /// The node this event belongs to, when tagged.
    pub fn node(&self) -> Option<&str> {
        self.metadata.node.as_deref()
    }

    /// Whether a `chain_start`/`chain_end` event marks a node boundary.
    ///
    /// Chain events fire for all sorts of internal wrappers; a node event
    /// either carries the node tag, or has a name containing "node" that is
    /// not one of the model/tool wrappers.
    pub fn is_node_event(&self) -> bool {
        if self.metadata.node.is_some() {
            return true;
        }
        let Some(name) = self.name.as_deref() else {
            return false;
        };
        let lower = name.to_lowercase();
        lower.contains("node")
            && !lower.contains("tool")
            && !lower.contains("model")
            && !lower.contains("llm")
            && !lower.contains("chat")
    }
}
