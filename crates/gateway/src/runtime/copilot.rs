//! Copilot generation sessions.
//!
//! Graph generation runs as an async multi-stage job (analysis → design →
//! validation → generation). The producer writes status and accumulated
//! content into an external TTL'd KV and publishes progress on a
//! per-session channel. When the KV is unreachable the feature degrades to
//! unavailable — endpoints fail fast rather than serving inconsistent
//! state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use strand_domain::llm::RunMessage;
use strand_domain::stream::LlmDelta;
use strand_domain::{Error, Result};
use strand_runtime::llm::{ChatRequest, LlmClient};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Generation pipeline stages, in order.
const STAGES: [&str; 4] = ["analysis", "design", "validation", "generation"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session status + events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopilotStatus {
    Generating,
    Completed,
    Failed,
}

impl CopilotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CopilotStatus::Generating => "generating",
            CopilotStatus::Completed => "completed",
            CopilotStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "generating" => Some(CopilotStatus::Generating),
            "completed" => Some(CopilotStatus::Completed),
            "failed" => Some(CopilotStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CopilotStatus::Generating)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CopilotEvent {
    #[serde(rename = "status")]
    Status { stage: String, message: String },
    #[serde(rename = "content")]
    Content { delta: String },
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CopilotSessionView {
    pub session_id: String,
    pub status: CopilotStatus,
    pub content: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// KV seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// External KV holding `copilot:session:{id}:status` / `:content` with a
/// TTL. A Redis-backed implementation slots in behind this trait.
#[async_trait::async_trait]
pub trait CopilotKv: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn set_status(&self, session_id: &str, status: CopilotStatus, ttl: Duration) -> Result<()>;
    async fn get_status(&self, session_id: &str) -> Result<Option<CopilotStatus>>;
    async fn append_content(&self, session_id: &str, content: &str, ttl: Duration) -> Result<()>;
    async fn get_content(&self, session_id: &str) -> Result<Option<String>>;
    async fn delete(&self, session_id: &str) -> Result<()>;
    /// Drop expired entries; a no-op for backends with native TTL.
    async fn sweep(&self) {}
}

fn status_key(session_id: &str) -> String {
    format!("copilot:session:{session_id}:status")
}

fn content_key(session_id: &str) -> String {
    format!("copilot:session:{session_id}:content")
}

/// In-process TTL'd KV. `set_available(false)` simulates an outage for the
/// availability contract.
pub struct MemoryKv {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    available: AtomicBool,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::Transient("copilot KV unreachable".into()))
        }
    }

    fn get_live(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        let (value, expires) = entries.get(key)?;
        if *expires <= Instant::now() {
            return None;
        }
        Some(value.clone())
    }

    /// Drop expired entries. Called from the background sweeper.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, (_, expires)| *expires > now);
    }
}

#[async_trait::async_trait]
impl CopilotKv for MemoryKv {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    async fn set_status(&self, session_id: &str, status: CopilotStatus, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.entries.write().insert(
            status_key(session_id),
            (status.as_str().to_string(), Instant::now() + ttl),
        );
        Ok(())
    }

    async fn get_status(&self, session_id: &str) -> Result<Option<CopilotStatus>> {
        self.check_available()?;
        Ok(self
            .get_live(&status_key(session_id))
            .as_deref()
            .and_then(CopilotStatus::parse))
    }

    async fn append_content(&self, session_id: &str, content: &str, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let key = content_key(session_id);
        let mut entries = self.entries.write();
        let expires = Instant::now() + ttl;
        match entries.get_mut(&key) {
            Some((existing, entry_expires)) => {
                existing.push_str(content);
                *entry_expires = expires;
            }
            None => {
                entries.insert(key, (content.to_string(), expires));
            }
        }
        Ok(())
    }

    async fn get_content(&self, session_id: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.get_live(&content_key(session_id)))
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.check_available()?;
        let mut entries = self.entries.write();
        entries.remove(&status_key(session_id));
        entries.remove(&content_key(session_id));
        Ok(())
    }

    async fn sweep(&self) {
        self.sweep_expired();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CopilotService {
    kv: Arc<dyn CopilotKv>,
    ttl: Duration,
    channels: RwLock<HashMap<String, broadcast::Sender<CopilotEvent>>>,
}

impl CopilotService {
    pub fn new(kv: Arc<dyn CopilotKv>, ttl: Duration) -> Self {
        Self {
            kv,
            ttl,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<CopilotEvent> {
        let mut channels = self.channels.write();
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn publish(&self, session_id: &str, event: CopilotEvent) {
        let channels = self.channels.read();
        if let Some(tx) = channels.get(session_id) {
            let _ = tx.send(event);
        }
    }

    fn cleanup_channel(&self, session_id: &str) {
        self.channels.write().remove(session_id);
    }

    /// Submit a generation job. Fails fast when the KV is unreachable;
    /// otherwise issues a session id and spawns the staged producer.
    pub async fn submit(self: Arc<Self>, prompt: String, llm: Arc<dyn LlmClient>) -> Result<String> {
        if !self.kv.is_available().await {
            return Err(Error::Transient("copilot KV unreachable".into()));
        }

        let session_id = Uuid::new_v4().to_string();
        self.kv
            .set_status(&session_id, CopilotStatus::Generating, self.ttl)
            .await?;

        let service = self;
        let id = session_id.clone();
        tokio::spawn(async move {
            match service.run_stages(&id, &prompt, llm).await {
                Ok(()) => {
                    if let Err(e) = service
                        .kv
                        .set_status(&id, CopilotStatus::Completed, service.ttl)
                        .await
                    {
                        tracing::warn!(session_id = %id, error = %e, "failed to mark copilot session completed");
                    }
                    service.publish(&id, CopilotEvent::Done);
                }
                Err(e) => {
                    tracing::error!(session_id = %id, error = %e, "copilot generation failed");
                    if let Err(kv_err) = service
                        .kv
                        .set_status(&id, CopilotStatus::Failed, service.ttl)
                        .await
                    {
                        tracing::warn!(session_id = %id, error = %kv_err, "failed to mark copilot session failed");
                    }
                    service.publish(
                        &id,
                        CopilotEvent::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
            service.cleanup_channel(&id);
        });

        Ok(session_id)
    }

    async fn run_stages(&self, session_id: &str, prompt: &str, llm: Arc<dyn LlmClient>) -> Result<()> {
        for stage in STAGES {
            self.publish(
                session_id,
                CopilotEvent::Status {
                    stage: stage.to_string(),
                    message: format!("{stage} in progress"),
                },
            );

            let stage_prompt = format!(
                "Stage: {stage}. Produce the {stage} artifact for this graph request:\n{prompt}"
            );
            let mut stream = llm
                .chat_stream(ChatRequest {
                    messages: vec![RunMessage::user(stage_prompt)],
                    model: None,
                    max_tokens: None,
                })
                .await?;

            let mut output = String::new();
            while let Some(delta) = stream.next().await {
                match delta? {
                    LlmDelta::Token { text } => {
                        output.push_str(&text);
                        self.publish(session_id, CopilotEvent::Content { delta: text });
                    }
                    LlmDelta::Done { .. } => break,
                    LlmDelta::ToolCall { .. } => {}
                }
            }

            let block = format!("## {stage}\n{output}\n");
            self.kv.append_content(session_id, &block, self.ttl).await?;
        }
        Ok(())
    }

    /// Current session view, read from the KV. `None` when the session is
    /// unknown or its keys expired.
    pub async fn session(&self, session_id: &str) -> Result<Option<CopilotSessionView>> {
        if !self.kv.is_available().await {
            return Err(Error::Transient("copilot KV unreachable".into()));
        }
        let Some(status) = self.kv.get_status(session_id).await? else {
            return Ok(None);
        };
        let content = self.kv.get_content(session_id).await?.unwrap_or_default();
        Ok(Some(CopilotSessionView {
            session_id: session_id.to_string(),
            status,
            content,
        }))
    }

    pub fn kv(&self) -> &Arc<dyn CopilotKv> {
        &self.kv
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
