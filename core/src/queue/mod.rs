//! Task queue (C4): durable per-account FIFO with priority push, blocking
//! pop with in-flight tracking, retry-with-backoff, and a dead-letter lane.
//! Grounded on `im/daemon.rs` (per-channel send-state map,
//! retry-after handling) generalized from "one channel" to "one account",
//! and on the real `redis` crate usage found in the pack for the backing
//! store.

pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::Task;

pub use memory_store::InMemoryTaskQueueStore;
pub use redis_store::RedisTaskQueueStore;

/// Capped exponential backoff for failed tasks: `min(300, 10 * 2^retry)`.
pub fn backoff_seconds(retry_count: u32) -> u64 {
    let exp = 10u64.saturating_mul(1u64 << retry_count.min(20));
    exp.min(300)
}

#[async_trait]
pub trait TaskQueueStore: Send + Sync {
    async fn enqueue(&self, task: Task, priority: bool) -> Result<(), QueueError>;

    /// Blocking pop with timeout; atomically moves the task into the
    /// account's in-flight set. `None` on timeout.
    async fn dequeue(&self, account_id: Uuid, timeout: std::time::Duration) -> Result<Option<Task>, QueueError>;

    async fn complete(&self, task: &Task) -> Result<(), QueueError>;

    /// On failure: re-enqueues at head with incremented retry_count after
    /// the backoff delay if `retry` and `retry_count < max_retries`;
    /// otherwise pushes to the dead-letter lane.
    async fn fail(&self, task: Task, error: String, retry: bool) -> Result<(), QueueError>;

    /// Startup sweep: re-enqueues at head every task left in any in-flight
    /// set, exactly once each (§8 invariant 8).
    async fn recover_processing_tasks(&self) -> Result<usize, QueueError>;

    async fn stats(&self, account_id: Uuid) -> Result<QueueStats, QueueError>;
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub dlq_size: u64,
}
