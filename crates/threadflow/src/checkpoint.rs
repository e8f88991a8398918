// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Checkpoint persistence.
//!
//! A [`Checkpoint`] is the durable record of a thread at the moment a step
//! paused: its accumulated state and the pending node to resume routing
//! from. Backends implement [`Checkpointer`]; the engine only ever needs
//! the latest checkpoint per thread, though a backend may retain history.
//! [`MemoryCheckpointer`] is the in-process reference backend used in tests
//! and examples; `threadflow-postgres-checkpointer` provides the durable
//! networked one. Both satisfy the same atomicity contract.

use crate::error::Result;
use crate::state::State;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable record of a paused thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint id.
    pub id: String,
    /// Thread this checkpoint belongs to.
    pub thread_id: String,
    /// State snapshot at the pause point.
    pub state: State,
    /// Node whose outgoing boundary paused the step, or `None` at true
    /// graph end (the next step runs from the graph start).
    pub pending_node: Option<String>,
    /// When this checkpoint was written.
    pub updated_at: SystemTime,
}

impl Checkpoint {
    /// Create a checkpoint stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        thread_id: impl Into<String>,
        state: State,
        pending_node: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            state,
            pending_node,
            updated_at: SystemTime::now(),
        }
    }
}

/// Summary of a thread known to a store, for session management.
#[derive(Clone, Debug, PartialEq)]
pub struct ThreadInfo {
    /// Thread identifier.
    pub thread_id: String,
    /// Pending node of the latest checkpoint.
    pub pending_node: Option<String>,
    /// Timestamp of the latest checkpoint.
    pub updated_at: SystemTime,
}

/// Checkpoint storage backend.
///
/// `save` must be atomic with respect to a single thread: a concurrent
/// reader of the same thread observes either the previous checkpoint or
/// the new one, never a partial write. Transient backend failures surface
/// as retryable [`CheckpointError`](crate::CheckpointError) variants and
/// never corrupt the last good checkpoint.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist a checkpoint as the latest for its thread.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Fetch the latest checkpoint for a thread, if any.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Delete all checkpoints for a thread. Idempotent: deleting an
    /// unknown thread is not an error.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// List known threads, most recently updated first.
    async fn list_threads(&self) -> Result<Vec<ThreadInfo>>;
}

/// In-memory checkpointer retaining only the latest checkpoint per thread.
///
/// Cloning shares the underlying store, so a clone handed to a compiled
/// graph observes the same checkpoints as the original.
#[derive(Clone, Debug, Default)]
pub struct MemoryCheckpointer {
    threads: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl MemoryCheckpointer {
    /// Create an empty in-memory checkpointer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut threads = self.threads.write().await;
        threads.insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut threads = self.threads.write().await;
        threads.remove(thread_id);
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadInfo>> {
        let threads = self.threads.read().await;
        let mut infos: Vec<ThreadInfo> = threads
            .values()
            .map(|cp| ThreadInfo {
                thread_id: cp.thread_id.clone(),
                pending_node: cp.pending_node.clone(),
                updated_at: cp.updated_at,
            })
            .collect();
        infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(infos)
    }
}

/// Timestamp conversion helpers shared by storage backends that persist
/// timestamps as integer columns.
pub mod checkpointer_helpers {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    /// Convert a timestamp to nanoseconds since the Unix epoch.
    /// Pre-epoch timestamps clamp to zero.
    #[must_use]
    pub fn timestamp_to_nanos(timestamp: SystemTime) -> i64 {
        timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    /// Convert nanoseconds since the Unix epoch back to a timestamp.
    /// Negative values clamp to the epoch.
    #[must_use]
    pub fn nanos_to_timestamp(nanos: i64) -> SystemTime {
        let nanos = u64::try_from(nanos).unwrap_or(0);
        UNIX_EPOCH + Duration::from_nanos(nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::checkpointer_helpers::{nanos_to_timestamp, timestamp_to_nanos};
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn checkpoint(thread_id: &str, pending: Option<&str>) -> Checkpoint {
        Checkpoint::new(
            thread_id,
            State::new().with("marker", thread_id),
            pending.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_save_then_get_latest() {
        let store = MemoryCheckpointer::new();
        store.save(checkpoint("t1", Some("confirm"))).await.unwrap();

        let loaded = store.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(loaded.thread_id, "t1");
        assert_eq!(loaded.pending_node.as_deref(), Some("confirm"));
        assert_eq!(loaded.state.get_str("marker"), Some("t1"));
    }

    #[tokio::test]
    async fn test_save_replaces_latest() {
        let store = MemoryCheckpointer::new();
        store.save(checkpoint("t1", Some("confirm"))).await.unwrap();
        store.save(checkpoint("t1", None)).await.unwrap();

        let loaded = store.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(loaded.pending_node, None);
    }

    #[tokio::test]
    async fn test_get_latest_unknown_thread_is_none() {
        let store = MemoryCheckpointer::new();
        assert!(store.get_latest("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_thread_is_idempotent() {
        let store = MemoryCheckpointer::new();
        store.save(checkpoint("t1", None)).await.unwrap();

        store.delete_thread("t1").await.unwrap();
        assert!(store.get_latest("t1").await.unwrap().is_none());

        // Deleting again (or deleting an unknown thread) is not an error.
        store.delete_thread("t1").await.unwrap();
        store.delete_thread("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_threads_most_recent_first() {
        let store = MemoryCheckpointer::new();

        let mut older = checkpoint("old", None);
        older.updated_at = UNIX_EPOCH + Duration::from_secs(100);
        let mut newer = checkpoint("new", Some("confirm"));
        newer.updated_at = UNIX_EPOCH + Duration::from_secs(200);

        store.save(older).await.unwrap();
        store.save(newer).await.unwrap();

        let threads = store.list_threads().await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].thread_id, "new");
        assert_eq!(threads[1].thread_id, "old");
    }

    #[tokio::test]
    async fn test_clone_shares_store() {
        let store = MemoryCheckpointer::new();
        let clone = store.clone();
        clone.save(checkpoint("t1", None)).await.unwrap();

        assert!(store.get_latest("t1").await.unwrap().is_some());
    }

    #[test]
    fn test_checkpoint_serde_round_trip() {
        let cp = checkpoint("t1", Some("confirm"));
        let encoded = serde_json::to_string(&cp).unwrap();
        let decoded: Checkpoint = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, cp);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let original = UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(nanos_to_timestamp(timestamp_to_nanos(original)), original);
        assert_eq!(timestamp_to_nanos(UNIX_EPOCH), 0);
        assert_eq!(nanos_to_timestamp(-5), UNIX_EPOCH);
    }
}
