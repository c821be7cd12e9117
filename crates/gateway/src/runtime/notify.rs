//! Per-user notification bus.
//!
//! Best-effort push channel used to nudge a user's other live sessions
//! (run stopped elsewhere, invitation accepted on another device).
//! Delivery failures are logged, never surfaced to the originating
//! operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct NotificationBus {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<Notification>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<Notification> {
        let mut channels = self.channels.write();
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Best-effort publish: a user with no live subscribers is a no-op.
    pub fn publish(&self, user_id: Uuid, notification: Notification) {
        let channels = self.channels.read();
        if let Some(tx) = channels.get(&user_id) {
            if let Err(e) = tx.send(notification) {
                tracing::debug!(user_id = %user_id, error = %e, "notification had no receivers");
            }
        }
    }

    /// Drop channels with no remaining subscribers.
    pub fn prune_idle(&self) {
        self.channels.write().retain(|_, tx| tx.receiver_count() > 0);
    }
}
