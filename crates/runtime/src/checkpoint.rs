//! Per-thread continuation storage.
//!
//! The runtime writes a [`StateSnapshot`] after every node; a snapshot with
//! pending tasks means the graph is suspended at an interrupt. The store is
//! opaque to the stream engine except for reads, which contend with the
//! runtime's own connection while a run is streaming — hence the retry
//! wrapper with exponential backoff and graceful degradation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use strand_domain::llm::RunMessage;
use strand_domain::{Error, Result};

use crate::runtime::{GraphRuntime, RunConfig};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A node execution the graph is suspended before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub target_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Checkpointed graph state: the state values plus any pending tasks.
/// Non-empty `tasks` ⟹ the graph is awaiting a resume command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default)]
    pub tasks: Vec<PendingTask>,
}

impl StateSnapshot {
    pub fn is_suspended(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Message transcript carried in the state values.
    pub fn messages(&self) -> Vec<RunMessage> {
        self.values
            .get("messages")
            .cloned()
            .and_then(|raw| serde_json::from_value(raw).ok())
            .unwrap_or_default()
    }

    pub fn set_messages(&mut self, messages: &[RunMessage]) {
        if let Ok(raw) = serde_json::to_value(messages) {
            self.values.insert("messages".into(), raw);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait + file implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<StateSnapshot>>;
    async fn save(&self, thread_id: &str, snapshot: &StateSnapshot) -> Result<()>;
    async fn clear(&self, thread_id: &str) -> Result<()>;
}

/// One JSON file per thread under `checkpoints/`, with a write-through
/// in-memory map so hot reads skip the filesystem.
pub struct FileCheckpointStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, StateSnapshot>>,
}

impl FileCheckpointStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("checkpoints");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{thread_id}.json"))
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        if let Some(snapshot) = self.cache.read().get(thread_id) {
            return Ok(Some(snapshot.clone()));
        }
        let path = self.path_for(thread_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let snapshot: StateSnapshot = serde_json::from_str(&raw)
            .map_err(|e| Error::Transient(format!("checkpoint read for {thread_id}: {e}")))?;
        self.cache
            .write()
            .insert(thread_id.to_string(), snapshot.clone());
        Ok(Some(snapshot))
    }

    async fn save(&self, thread_id: &str, snapshot: &StateSnapshot) -> Result<()> {
        let path = self.path_for(thread_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string(snapshot)?)?;
        std::fs::rename(&tmp, &path)?;
        self.cache
            .write()
            .insert(thread_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn clear(&self, thread_id: &str) -> Result<()> {
        self.cache.write().remove(thread_id);
        let path = self.path_for(thread_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry wrapper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read the runtime's state, retrying under contention.
///
/// The runtime holds its own checkpoint connection while streaming, so a
/// concurrent read may fail transiently. Retries up to `attempts` times
/// with exponential backoff starting at `first_backoff`; persistent failure
/// is logged at warn and degrades to `None` ("assume no interrupt" — the
/// next call will re-observe one if present).
pub async fn read_state_with_retry(
    runtime: &dyn GraphRuntime,
    config: &RunConfig,
    attempts: u32,
    first_backoff: Duration,
) -> Option<StateSnapshot> {
    let mut backoff = first_backoff;
    for attempt in 1..=attempts {
        match runtime.get_state(config).await {
            Ok(snapshot) => return Some(snapshot),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::debug!(
                    thread_id = %config.thread_id,
                    attempt,
                    error = %e,
                    "checkpoint state read contended, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => {
                tracing::warn!(
                    thread_id = %config.thread_id,
                    attempt,
                    error = %e,
                    "checkpoint state read failed, assuming no interrupt"
                );
                return None;
            }
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ResumeCommand;
    use crate::runtime::{EventStream, RunInput};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        assert!(store.load("t1").await.unwrap().is_none());

        let mut snapshot = StateSnapshot::default();
        snapshot.set_messages(&[RunMessage::user("hi")]);
        snapshot.tasks.push(PendingTask {
            target_node: "review".into(),
            label: Some("Review".into()),
        });
        store.save("t1", &snapshot).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert!(loaded.is_suspended());
        assert_eq!(loaded.messages()[0].content, "hi");
        assert_eq!(loaded.tasks[0].target_node, "review");

        store.clear("t1").await.unwrap();
        assert!(store.load("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileCheckpointStore::new(dir.path()).unwrap();
            store.save("t", &StateSnapshot::default()).await.unwrap();
        }
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        assert!(store.load("t").await.unwrap().is_some());
    }

    /// Runtime whose `get_state` fails transiently a configurable number of
    /// times before succeeding.
    struct FlakyRuntime {
        failures: AtomicU32,
        permanent: bool,
    }

    #[async_trait::async_trait]
    impl GraphRuntime for FlakyRuntime {
        async fn stream_events(&self, _input: RunInput, _config: &RunConfig) -> Result<EventStream> {
            unimplemented!("not used by this test")
        }
        async fn resume(&self, _command: ResumeCommand, _config: &RunConfig) -> Result<EventStream> {
            unimplemented!("not used by this test")
        }
        async fn get_state(&self, _config: &RunConfig) -> Result<StateSnapshot> {
            if self.permanent {
                return Err(Error::Transient("store busy".into()));
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Transient("store busy".into()));
            }
            Ok(StateSnapshot::default())
        }
        async fn cleanup(&self) {}
    }

    fn config() -> RunConfig {
        RunConfig {
            thread_id: "t".into(),
            run_id: uuid::Uuid::new_v4(),
            recursion_limit: 100,
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let runtime = FlakyRuntime {
            failures: AtomicU32::new(2),
            permanent: false,
        };
        let snapshot =
            read_state_with_retry(&runtime, &config(), 3, Duration::from_millis(1)).await;
        assert!(snapshot.is_some());
    }

    #[tokio::test]
    async fn retry_degrades_to_none_on_persistent_failure() {
        let runtime = FlakyRuntime {
            failures: AtomicU32::new(0),
            permanent: true,
        };
        let snapshot =
            read_state_with_retry(&runtime, &config(), 3, Duration::from_millis(1)).await;
        assert!(snapshot.is_none());
    }
}
