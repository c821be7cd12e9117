//! Resume command for continuing an interrupted run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied continuation for a suspended graph.
///
/// `update` is merged into the checkpointed state values before execution
/// continues; `goto` overrides the pending task's target node. Either may
/// be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<String>,
}

impl ResumeCommand {
    pub fn with_update(mut self, update: Map<String, Value>) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_goto(mut self, goto: impl Into<String>) -> Self {
        self.goto = Some(goto.into());
        self
    }
}
