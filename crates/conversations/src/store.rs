//! Conversation store.
//!
//! The index lives in `conversations/conversations.json`; each thread's
//! messages are appended to `conversations/threads/<thread_id>.jsonl`.
//! The user message of a turn is committed before streaming begins; the
//! assistant message is persisted by the stream engine's finalizer on
//! every exit path, so teardown writes must never depend on request state.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use strand_domain::llm::{last_assistant, Role, RunMessage};
use strand_domain::{Error, Result};

/// Metadata key holding the graph id of a suspended run.
const INTERRUPTED_GRAPH_ID: &str = "interrupted_graph_id";

/// Conversation titles are derived from the first characters of the seed
/// message.
const TITLE_MAX_CHARS: usize = 50;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub thread_id: String,
    pub owner_user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Graph id of the run awaiting resume, if any.
    pub fn interrupted_graph_id(&self) -> Option<Uuid> {
        self.metadata
            .get(INTERRUPTED_GRAPH_ID)
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// One line of a thread's message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConversationStore {
    index_path: PathBuf,
    threads_dir: PathBuf,
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("conversations");
        let threads_dir = dir.join("threads");
        std::fs::create_dir_all(&threads_dir)?;

        let index_path = dir.join("conversations.json");
        let conversations: HashMap<String, Conversation> = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            conversations = conversations.len(),
            path = %index_path.display(),
            "conversation store loaded"
        );

        Ok(Self {
            index_path,
            threads_dir,
            conversations: RwLock::new(conversations),
        })
    }

    // ── Conversations ────────────────────────────────────────────────

    pub fn get(&self, thread_id: &str) -> Option<Conversation> {
        self.conversations.read().get(thread_id).cloned()
    }

    pub fn require(&self, thread_id: &str) -> Result<Conversation> {
        self.get(thread_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {thread_id} not found")))
    }

    pub fn list_for_owner(&self, owner: Uuid) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self
            .conversations
            .read()
            .values()
            .filter(|c| c.owner_user_id == owner)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    /// Fetch or lazily create the conversation for a thread. Upsert
    /// semantics when `thread_id` is provided: an existing conversation is
    /// returned as-is, a missing one is created under the given id.
    pub fn get_or_create(
        &self,
        thread_id: Option<String>,
        owner: Uuid,
        seed_message: &str,
        metadata: Value,
    ) -> Result<(String, Conversation)> {
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(existing) = self.get(&thread_id) {
            return Ok((thread_id, existing));
        }

        let now = Utc::now();
        let conversation = Conversation {
            thread_id: thread_id.clone(),
            owner_user_id: owner,
            title: derive_title(seed_message),
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.conversations
            .write()
            .insert(thread_id.clone(), conversation.clone());
        self.flush()?;

        tracing::debug!(thread_id = %thread_id, "conversation created");
        Ok((thread_id, conversation))
    }

    fn touch(&self, thread_id: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.write();
            let conversation = conversations
                .get_mut(thread_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {thread_id} not found")))?;
            conversation.updated_at = Utc::now();
        }
        self.flush()
    }

    // ── Messages ─────────────────────────────────────────────────────

    pub fn append_user_message(
        &self,
        thread_id: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<()> {
        self.append_line(
            thread_id,
            StoredMessage {
                timestamp: Utc::now(),
                role: Role::User,
                content: content.to_string(),
                metadata,
            },
        )?;
        self.touch(thread_id)
    }

    /// Persist the run's final assistant message.
    ///
    /// Takes the full message list from the runtime and extracts the last
    /// assistant entry. Tool-call metadata is best-effort: a failure to
    /// encode it is logged and the message is saved without it. Returns
    /// whether anything was persisted.
    pub fn append_assistant_message(&self, thread_id: &str, messages: &[RunMessage]) -> Result<bool> {
        let Some(assistant) = last_assistant(messages) else {
            return Ok(false);
        };

        let metadata = if assistant.tool_calls.is_empty() {
            None
        } else {
            match serde_json::to_value(&assistant.tool_calls) {
                Ok(calls) => Some(json!({ "tool_calls": calls })),
                Err(e) => {
                    tracing::warn!(thread_id = %thread_id, error = %e, "dropping unencodable tool_calls metadata");
                    None
                }
            }
        };

        self.append_line(
            thread_id,
            StoredMessage {
                timestamp: Utc::now(),
                role: Role::Assistant,
                content: assistant.content.clone(),
                metadata,
            },
        )?;
        self.touch(thread_id)?;
        Ok(true)
    }

    pub fn messages(&self, thread_id: &str) -> Result<Vec<StoredMessage>> {
        let path = self.thread_path(thread_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut messages = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredMessage>(line) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(thread_id = %thread_id, error = %e, "skipping malformed message line");
                }
            }
        }
        Ok(messages)
    }

    fn append_line(&self, thread_id: &str, message: StoredMessage) -> Result<()> {
        let path = self.thread_path(thread_id);
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.threads_dir.join(format!("{thread_id}.jsonl"))
    }

    // ── Interrupt marker ─────────────────────────────────────────────

    pub fn set_interrupt_marker(&self, thread_id: &str, graph_id: Uuid) -> Result<()> {
        self.update_metadata(thread_id, |meta| {
            meta.insert(
                INTERRUPTED_GRAPH_ID.into(),
                Value::String(graph_id.to_string()),
            );
        })
    }

    /// Safe no-op when no marker is present.
    pub fn clear_interrupt_marker(&self, thread_id: &str) -> Result<()> {
        self.update_metadata(thread_id, |meta| {
            meta.remove(INTERRUPTED_GRAPH_ID);
        })
    }

    pub fn interrupt_marker(&self, thread_id: &str) -> Option<Uuid> {
        self.get(thread_id)
            .and_then(|c| c.interrupted_graph_id())
    }

    fn update_metadata<F>(&self, thread_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut serde_json::Map<String, Value>),
    {
        {
            let mut conversations = self.conversations.write();
            let conversation = conversations
                .get_mut(thread_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {thread_id} not found")))?;
            let mut meta = match conversation.metadata.take() {
                Value::Object(map) => map,
                _ => Default::default(),
            };
            f(&mut meta);
            conversation.metadata = Value::Object(meta);
            conversation.updated_at = Utc::now();
        }
        self.flush()
    }

    // ── Persistence ──────────────────────────────────────────────────

    pub fn flush(&self) -> Result<()> {
        let conversations = self.conversations.read();
        let tmp = self.index_path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(&*conversations)?;
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }
}

fn derive_title(seed: &str) -> String {
    let trimmed = seed.trim();
    if trimmed.is_empty() {
        return "New conversation".into();
    }
    trimmed.chars().take(TITLE_MAX_CHARS).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use strand_domain::llm::ToolCallRecord;

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn get_or_create_is_upsert() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();

        let (thread_id, created) = store
            .get_or_create(Some("t-1".into()), owner, "hello there", json!({}))
            .unwrap();
        assert_eq!(thread_id, "t-1");
        assert_eq!(created.title, "hello there");

        // Second call returns the existing conversation untouched.
        let (_, again) = store
            .get_or_create(Some("t-1".into()), owner, "different seed", json!({}))
            .unwrap();
        assert_eq!(again.title, "hello there");
    }

    #[test]
    fn generated_thread_id_when_absent() {
        let (_dir, store) = store();
        let (thread_id, _) = store
            .get_or_create(None, Uuid::new_v4(), "seed", json!({}))
            .unwrap();
        assert!(Uuid::parse_str(&thread_id).is_ok());
    }

    #[test]
    fn title_is_first_50_chars() {
        let (_dir, store) = store();
        let seed = "x".repeat(80);
        let (_, conversation) = store
            .get_or_create(None, Uuid::new_v4(), &seed, json!({}))
            .unwrap();
        assert_eq!(conversation.title.chars().count(), 50);
    }

    #[test]
    fn messages_round_trip_in_order() {
        let (_dir, store) = store();
        let (thread_id, _) = store
            .get_or_create(Some("t".into()), Uuid::new_v4(), "hi", json!({}))
            .unwrap();

        store.append_user_message(&thread_id, "hi", None).unwrap();
        let persisted = store
            .append_assistant_message(
                &thread_id,
                &[RunMessage::user("hi"), RunMessage::assistant("hello!")],
            )
            .unwrap();
        assert!(persisted);

        let messages = store.messages(&thread_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "hello!");
    }

    #[test]
    fn assistant_tool_calls_land_in_metadata() {
        let (_dir, store) = store();
        let (thread_id, _) = store
            .get_or_create(Some("t".into()), Uuid::new_v4(), "hi", json!({}))
            .unwrap();

        let assistant = RunMessage::assistant("done").with_tool_calls(vec![ToolCallRecord {
            name: "web_search".into(),
            arguments: json!({"q": "rust"}),
            id: "call_1".into(),
        }]);
        store
            .append_assistant_message(&thread_id, &[assistant])
            .unwrap();

        let messages = store.messages(&thread_id).unwrap();
        let meta = messages[0].metadata.as_ref().unwrap();
        assert_eq!(meta["tool_calls"][0]["name"], json!("web_search"));
    }

    #[test]
    fn append_assistant_without_assistant_is_noop() {
        let (_dir, store) = store();
        let (thread_id, _) = store
            .get_or_create(Some("t".into()), Uuid::new_v4(), "hi", json!({}))
            .unwrap();
        let persisted = store
            .append_assistant_message(&thread_id, &[RunMessage::user("only user")])
            .unwrap();
        assert!(!persisted);
        assert!(store.messages(&thread_id).unwrap().is_empty());
    }

    #[test]
    fn interrupt_marker_set_and_clear_idempotent() {
        let (_dir, store) = store();
        let (thread_id, _) = store
            .get_or_create(Some("t".into()), Uuid::new_v4(), "hi", json!({}))
            .unwrap();
        let graph_id = Uuid::new_v4();

        assert!(store.interrupt_marker(&thread_id).is_none());
        store.set_interrupt_marker(&thread_id, graph_id).unwrap();
        assert_eq!(store.interrupt_marker(&thread_id), Some(graph_id));

        store.clear_interrupt_marker(&thread_id).unwrap();
        assert!(store.interrupt_marker(&thread_id).is_none());
        // Clearing again is a safe no-op.
        store.clear_interrupt_marker(&thread_id).unwrap();
    }

    #[test]
    fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConversationStore::new(dir.path()).unwrap();
            let (thread_id, _) = store
                .get_or_create(Some("t".into()), Uuid::new_v4(), "persist me", json!({}))
                .unwrap();
            store.append_user_message(&thread_id, "persist me", None).unwrap();
        }
        let store = ConversationStore::new(dir.path()).unwrap();
        assert_eq!(store.get("t").unwrap().title, "persist me");
        assert_eq!(store.messages("t").unwrap().len(), 1);
    }
}
