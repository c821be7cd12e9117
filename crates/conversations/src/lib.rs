//! Conversation threads and their append-only message logs.
//!
//! A thread owns exactly one conversation; messages are append-only JSONL,
//! one file per thread. Conversation metadata carries the
//! `interrupted_graph_id` marker while a run is suspended awaiting resume.

pub mod store;

pub use store::{Conversation, ConversationStore, StoredMessage};
