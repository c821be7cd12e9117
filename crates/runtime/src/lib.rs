//! Graph execution runtime.
//!
//! The [`runtime::GraphRuntime`] trait is the contract the stream engine
//! depends on: a compiled graph emits a typed event stream for a turn,
//! supports resume-from-command, and exposes its checkpointed state. The
//! built-in [`graph::AgentGraphRuntime`] executes authored graphs of LLM
//! agent nodes; alternative executors plug in behind the same trait.

pub mod checkpoint;
pub mod command;
pub mod event;
pub mod graph;
pub mod llm;
pub mod resolver;
pub mod runtime;
pub mod tool;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, PendingTask, StateSnapshot};
pub use command::ResumeCommand;
pub use event::{RuntimeEvent, RuntimeEventKind};
pub use resolver::{GraphResolver, ResolvedRun};
pub use runtime::{EventStream, GraphRuntime, RunConfig, RunInput};
