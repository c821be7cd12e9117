//! The runtime contract the stream engine drives.

use serde_json::{Map, Value};
use uuid::Uuid;

use strand_domain::llm::RunMessage;
use strand_domain::stream::BoxStream;
use strand_domain::Result;

use crate::checkpoint::StateSnapshot;
use crate::command::ResumeCommand;
use crate::event::RuntimeEvent;

/// Lazy event sequence for one turn.
pub type EventStream = BoxStream<'static, Result<RuntimeEvent>>;

/// Input for a fresh turn.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    pub messages: Vec<RunMessage>,
    /// Context variables seeded from the graph's declared variables.
    pub context: Map<String, Value>,
}

/// Per-run configuration. The runtime is stateless across requests; the
/// thread id keys the checkpointed continuation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub thread_id: String,
    pub run_id: Uuid,
    pub recursion_limit: u32,
}

/// A compiled graph ready for execution.
///
/// Implementations own node dispatch and checkpointing internals; the
/// execution core only consumes this interface.
#[async_trait::async_trait]
pub trait GraphRuntime: Send + Sync {
    /// Execute a turn, emitting events lazily. Events for a given node
    /// arrive in causal order; `*_end` events follow their `*_start`.
    async fn stream_events(&self, input: RunInput, config: &RunConfig) -> Result<EventStream>;

    /// Continue from the checkpointed state using a resume command.
    async fn resume(&self, command: ResumeCommand, config: &RunConfig) -> Result<EventStream>;

    /// Read the checkpointed state. May fail transiently while a run holds
    /// the store's connection; callers use the retry wrapper.
    async fn get_state(&self, config: &RunConfig) -> Result<StateSnapshot>;

    /// Release process-wide resources (containerized tool backends and the
    /// like). Invoked best-effort on every run teardown.
    async fn cleanup(&self);
}
