//! In-flight run tracking, one handle per conversation thread.
//!
//! The stop flag is the cooperative signal the stream loop polls between
//! events; the cancellation token is the forceful one that aborts
//! suspended I/O inside the runtime. Client-initiated stops set the flag
//! first, then cancel, so persistence still runs gracefully.
//!
//! State is process-local: a single process owns a thread id for the
//! duration of a turn. Failover abandons the run; the next turn starts
//! fresh from the checkpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// How long `register` waits for a displaced task's finalizer before
/// taking over the thread.
const DISPLACE_GRACE: Duration = Duration::from_millis(10);
const DISPLACE_GRACE_ROUNDS: u32 = 5;

#[derive(Clone)]
pub struct TaskHandle {
    pub thread_id: String,
    stop: Arc<AtomicBool>,
    cancel: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl TaskHandle {
    fn new(thread_id: String) -> Self {
        Self {
            thread_id,
            stop: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Token aborted by a forceful cancel; the runtime selects on it
    /// around blocking I/O.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Registry of in-flight runs keyed by thread id.
#[derive(Default)]
pub struct TaskManager {
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle for a thread. An existing handle is displaced: it is
    /// cancelled, and we briefly wait for its finalizer to deregister so
    /// the old run's persistence cannot race the new run's.
    pub async fn register(&self, thread_id: &str) -> TaskHandle {
        let previous = self.tasks.lock().get(thread_id).cloned();
        if let Some(previous) = previous {
            tracing::warn!(thread_id, "displacing existing task for thread");
            previous.stop.store(true, Ordering::Release);
            previous.cancel.cancel();
            for _ in 0..DISPLACE_GRACE_ROUNDS {
                if !self.is_running(thread_id) {
                    break;
                }
                tokio::time::sleep(DISPLACE_GRACE).await;
            }
        }

        let handle = TaskHandle::new(thread_id.to_string());
        self.tasks
            .lock()
            .insert(thread_id.to_string(), handle.clone());
        handle
    }

    /// Remove the handle for a thread. Idempotent.
    pub fn unregister(&self, thread_id: &str) {
        self.tasks.lock().remove(thread_id);
    }

    /// Set the cooperative stop flag. Returns whether a handle existed.
    /// Idempotent.
    pub fn stop(&self, thread_id: &str) -> bool {
        match self.tasks.lock().get(thread_id) {
            Some(handle) => {
                handle.stop.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Trigger the forceful cancellation token. Used after `stop` to abort
    /// suspended operations inside the runtime.
    pub fn cancel(&self, thread_id: &str) -> bool {
        match self.tasks.lock().get(thread_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Read the stop flag; false when no handle exists.
    pub fn is_stopped(&self, thread_id: &str) -> bool {
        self.tasks
            .lock()
            .get(thread_id)
            .map(|h| h.is_stopped())
            .unwrap_or(false)
    }

    pub fn is_running(&self, thread_id: &str) -> bool {
        self.tasks.lock().contains_key(thread_id)
    }

    pub fn running_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_stop_unregister_lifecycle() {
        let manager = TaskManager::new();
        let handle = manager.register("t1").await;
        assert!(manager.is_running("t1"));
        assert!(!manager.is_stopped("t1"));

        assert!(manager.stop("t1"));
        assert!(manager.is_stopped("t1"));
        assert!(handle.is_stopped());

        manager.unregister("t1");
        assert!(!manager.is_running("t1"));
        assert!(!manager.is_stopped("t1"));
    }

    #[tokio::test]
    async fn stop_without_handle_returns_false() {
        let manager = TaskManager::new();
        assert!(!manager.stop("ghost"));
        assert!(!manager.cancel("ghost"));
        assert!(!manager.is_stopped("ghost"));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let manager = TaskManager::new();
        manager.register("t").await;
        assert!(manager.stop("t"));
        assert!(manager.stop("t"));
        assert!(manager.is_stopped("t"));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let manager = TaskManager::new();
        manager.register("t").await;
        manager.unregister("t");
        manager.unregister("t");
        assert!(!manager.is_running("t"));
    }

    #[tokio::test]
    async fn cancel_fires_token() {
        let manager = TaskManager::new();
        let handle = manager.register("t").await;
        let token = handle.cancellation_token();
        assert!(!token.is_cancelled());
        assert!(manager.cancel("t"));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn at_most_one_handle_per_thread() {
        let manager = TaskManager::new();
        let first = manager.register("t").await;
        // Second registration displaces the first: the old handle is
        // stopped and cancelled.
        let second = manager.register("t").await;
        assert!(first.is_stopped());
        assert!(first.cancellation_token().is_cancelled());
        assert!(!second.is_stopped());
        assert_eq!(manager.running_count(), 1);
    }

    #[tokio::test]
    async fn displacement_waits_for_finalizer() {
        let manager = Arc::new(TaskManager::new());
        manager.register("t").await;

        // Simulate the displaced run's finalizer deregistering shortly
        // after cancellation.
        let m = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            m.unregister("t");
        });

        let handle = manager.register("t").await;
        assert!(!handle.is_stopped());
        assert!(manager.is_running("t"));
    }

    #[tokio::test]
    async fn concurrent_threads_are_independent() {
        let manager = Arc::new(TaskManager::new());
        let mut handles = Vec::new();
        for i in 0..10 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move {
                m.register(&format!("t{i}")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(manager.running_count(), 10);

        manager.stop("t3");
        assert!(manager.is_stopped("t3"));
        assert!(!manager.is_stopped("t4"));
    }
}
