use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::llm::ToolCallRecord;

/// A boxed async stream, used for LLM and runtime event streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted by an LLM provider during one streaming completion
/// (provider-agnostic). The runtime's graph nodes consume these and
/// re-emit them as node-scoped runtime events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LlmDelta {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A fully assembled tool call requested by the model.
    #[serde(rename = "tool_call")]
    ToolCall { call: ToolCallRecord },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done { usage: Option<Usage> },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
