//! Event subscriber — pub/sub layer on top of the [`EventStore`].
//!
//! A thin passthrough: `publish` appends to the store, `subscribe` tails
//! it. This component carries no state of its own beyond the store
//! handle — it exists as a named seam so callers (the [`super::task_updater::TaskUpdater`]
//! on the publish side, [`super::task_manager::TaskManager`] on the
//! subscribe side) don't depend on the store's concrete backend.

use std::sync::Arc;

use serde_json::Value;

use crate::error::A2AResult;

use super::event_store::{EventStore, EventTail};

/// Couples append (via [`EventStore`]) with delivery to live consumers.
pub struct EventSubscriber {
    store: Arc<dyn EventStore>,
}

impl EventSubscriber {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Append an event and wake any tailers — thin passthrough to the store.
    pub async fn publish(&self, task_id: &str, kind: &str, payload: Value) -> A2AResult<u64> {
        self.store.append(task_id, kind, payload).await
    }

    /// Subscribe to a task's log starting at `from_seq`.
    ///
    /// Terminates when the log closes or the returned stream is dropped.
    pub async fn subscribe(&self, task_id: &str, from_seq: u64) -> A2AResult<EventTail> {
        self.store.tail_from(task_id, from_seq).await
    }

    /// Replay the full historical log, ordered by `seq`.
    pub async fn replay_all(&self, task_id: &str) -> A2AResult<Vec<super::event_store::EventLogRecord>> {
        self.store.read_all(task_id).await
    }

    /// Mark a task's log terminal. Idempotent.
    pub async fn close(&self, task_id: &str) -> A2AResult<()> {
        self.store.close(task_id).await
    }

    /// Whether a task's log has been closed.
    pub async fn is_closed(&self, task_id: &str) -> A2AResult<bool> {
        self.store.is_closed(task_id).await
    }

    /// Access the underlying store, e.g. for a transport layer that wants
    /// to hand a raw [`EventStore`] handle to diagnostics.
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }
}
