//! LLM client seam and the OpenAI-compatible streaming adapter.
//!
//! Works with any endpoint that follows the OpenAI chat completions
//! contract. Credential resolution happens outside the core; the client is
//! built from an opaque [`LlmParams`] bundle.

use std::sync::Arc;

use serde_json::{json, Value};

use strand_domain::llm::{LlmParams, Role, RunMessage, ToolCallRecord};
use strand_domain::stream::{BoxStream, LlmDelta, Usage};
use strand_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One streaming chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<RunMessage>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<LlmDelta>>>;
}

/// Builds clients from resolved per-call parameters.
pub trait LlmClientFactory: Send + Sync {
    fn client(&self, params: &LlmParams) -> Result<Arc<dyn LlmClient>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OpenAI-compatible HTTP client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpLlmClient {
    client: reqwest::Client,
    params: LlmParams,
}

impl HttpLlmClient {
    pub fn new(params: LlmParams) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Provider {
                provider: "openai-compat".into(),
                message: e.to_string(),
            })?;
        Ok(Self { client, params })
    }

    fn chat_url(&self) -> String {
        let base = self
            .params
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(message_to_wire).collect();
        json!({
            "model": req.model.clone().unwrap_or_else(|| self.params.model.clone()),
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(self.params.max_tokens),
            "stream": true,
            "stream_options": {"include_usage": true},
        })
    }
}

/// Default factory: one HTTP client per resolved parameter bundle.
pub struct HttpLlmClientFactory;

impl LlmClientFactory for HttpLlmClientFactory {
    fn client(&self, params: &LlmParams) -> Result<Arc<dyn LlmClient>> {
        Ok(Arc::new(HttpLlmClient::new(params.clone())?))
    }
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<LlmDelta>>> {
        let mut request = self
            .client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .json(&self.build_body(&req));
        if let Some(key) = &self.params.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| Error::Provider {
            provider: "openai-compat".into(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "openai-compat".into(),
                message: format!("{status}: {body}"),
            });
        }

        Ok(sse_delta_stream(response))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn message_to_wire(message: &RunMessage) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut wire = json!({ "role": role, "content": message.content });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = Value::Array(
            message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        },
                    })
                })
                .collect(),
        );
    }
    wire
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extract complete `data:` payloads from an SSE buffer.
///
/// Events are delimited by `\n\n`; consumed bytes are drained in place and
/// any trailing partial event remains for the next call.
fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);
        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }
    data_lines
}

/// Tool-call assembly state: `index -> (id, name, arguments-json)`.
#[derive(Default)]
struct ToolCallAssembly {
    calls: Vec<(String, String, String)>,
}

impl ToolCallAssembly {
    fn apply(&mut self, deltas: &Value) {
        let Some(deltas) = deltas.as_array() else {
            return;
        };
        for delta in deltas {
            let index = delta.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
            while self.calls.len() <= index {
                self.calls.push(Default::default());
            }
            let slot = &mut self.calls[index];
            if let Some(id) = delta.get("id").and_then(Value::as_str) {
                slot.0 = id.to_string();
            }
            if let Some(name) = delta
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
            {
                slot.1.push_str(name);
            }
            if let Some(arguments) = delta
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
            {
                slot.2.push_str(arguments);
            }
        }
    }

    fn finish(&mut self) -> Vec<ToolCallRecord> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .filter(|(_, name, _)| !name.is_empty())
            .map(|(id, name, raw_arguments)| {
                let arguments = if raw_arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&raw_arguments).unwrap_or_else(|e| {
                        tracing::warn!(
                            tool = %name,
                            error = %e,
                            "tool call arguments are not valid JSON; defaulting to empty object"
                        );
                        Value::Object(Default::default())
                    })
                };
                ToolCallRecord { name, arguments, id }
            })
            .collect()
    }
}

fn parse_usage(raw: &Value) -> Option<Usage> {
    let usage = raw.get("usage")?;
    Some(Usage {
        prompt_tokens: usage.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64)? as u32,
        total_tokens: usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
    })
}

fn sse_delta_stream(response: reqwest::Response) -> BoxStream<'static, Result<LlmDelta>> {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut assembly = ToolCallAssembly::default();
        let mut usage: Option<Usage> = None;
        let mut done_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        if data == "[DONE]" {
                            for call in assembly.finish() {
                                yield Ok(LlmDelta::ToolCall { call });
                            }
                            yield Ok(LlmDelta::Done { usage: usage.take() });
                            done_emitted = true;
                            continue;
                        }
                        let Ok(parsed) = serde_json::from_str::<Value>(&data) else {
                            continue;
                        };
                        if let Some(u) = parse_usage(&parsed) {
                            usage = Some(u);
                        }
                        let delta = &parsed["choices"][0]["delta"];
                        if let Some(text) = delta.get("content").and_then(Value::as_str) {
                            if !text.is_empty() {
                                yield Ok(LlmDelta::Token { text: text.to_string() });
                            }
                        }
                        if let Some(tool_deltas) = delta.get("tool_calls") {
                            assembly.apply(tool_deltas);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(Error::Provider {
                        provider: "openai-compat".into(),
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        if !done_emitted {
            for call in assembly.finish() {
                yield Ok(LlmDelta::ToolCall { call });
            }
            yield Ok(LlmDelta::Done { usage });
        }
    };
    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
