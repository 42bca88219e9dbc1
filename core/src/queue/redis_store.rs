//! Redis-backed `TaskQueueStore`, the reference store named in §6. Key
//! layout matches spec.md exactly: `queue:<account>` (list), `processing:
//! <account>` (hash id→task JSON), `dead_letter` (list), `stats:*` counters.
//! Grounded on the real `redis` crate usage for `tokio-comp` +
//! `connection-manager` found in the pack (`examples/other_examples/*co8-
//! cctelegram*`).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::Task;

use super::{backoff_seconds, QueueStats, TaskQueueStore};

pub struct RedisTaskQueueStore {
    conn: ConnectionManager,
}

impl RedisTaskQueueStore {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| QueueError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }

    fn queue_key(account_id: Uuid) -> String {
        format!("queue:{account_id}")
    }

    fn processing_key(account_id: Uuid) -> String {
        format!("processing:{account_id}")
    }
}

#[async_trait]
impl TaskQueueStore for RedisTaskQueueStore {
    async fn enqueue(&self, task: Task, priority: bool) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&task)?;
        let key = Self::queue_key(task.account_id);
        if priority {
            let _: () = conn
                .lpush(&key, payload)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
        } else {
            let _: () = conn
                .rpush(&key, payload)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
        }
        let _: () = conn
            .incr("stats:enqueued", 1)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn dequeue(
        &self,
        account_id: Uuid,
        timeout: std::time::Duration,
    ) -> Result<Option<Task>, QueueError> {
        let mut conn = self.conn.clone();
        let key = Self::queue_key(account_id);
        let result: Option<(String, String)> = conn
            .blpop(&key, timeout.as_secs_f64())
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let Some((_, payload)) = result else {
            return Ok(None);
        };
        let task: Task = serde_json::from_str(&payload)?;
        let processing_key = Self::processing_key(account_id);
        let _: () = conn
            .hset(&processing_key, task.id.to_string(), &payload)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Some(task))
    }

    async fn complete(&self, task: &Task) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let processing_key = Self::processing_key(task.account_id);
        let removed: i32 = conn
            .hdel(&processing_key, task.id.to_string())
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        if removed == 0 {
            return Err(QueueError::NotInProcessing(task.id.to_string()));
        }
        let _: () = conn
            .incr("stats:completed", 1)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn fail(&self, mut task: Task, error: String, retry: bool) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let processing_key = Self::processing_key(task.account_id);
        let _: () = conn
            .hdel(&processing_key, task.id.to_string())
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        task.last_error = Some(error);

        if retry && task.retry_count < task.max_retries {
            let delay = backoff_seconds(task.retry_count);
            task.retry_count += 1;
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
            self.enqueue(task, true).await
        } else {
            let payload = serde_json::to_string(&task)?;
            let _: () = conn
                .rpush("dead_letter", payload)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            let _: () = conn
                .incr("stats:failed", 1)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            Ok(())
        }
    }

    /// Scans every `processing:*` key and re-enqueues its tasks at the head
    /// of the matching account queue, exactly once each.
    async fn recover_processing_tasks(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys("processing:*")
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let mut recovered = 0;
        for key in keys {
            let entries: Vec<(String, String)> = conn
                .hgetall(&key)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            let account_id = key
                .strip_prefix("processing:")
                .and_then(|s| s.parse::<Uuid>().ok());
            let Some(account_id) = account_id else { continue };
            let queue_key = Self::queue_key(account_id);
            for (_, payload) in entries {
                let _: () = conn
                    .lpush(&queue_key, &payload)
                    .await
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                recovered += 1;
            }
            let _: () = conn
                .del(&key)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
        }
        Ok(recovered)
    }

    async fn stats(&self, account_id: Uuid) -> Result<QueueStats, QueueError> {
        let mut conn = self.conn.clone();
        let enqueued: u64 = conn
            .get("stats:enqueued")
            .await
            .unwrap_or(Some(0))
            .unwrap_or(0);
        let completed: u64 = conn
            .get("stats:completed")
            .await
            .unwrap_or(Some(0))
            .unwrap_or(0);
        let failed: u64 = conn
            .get("stats:failed")
            .await
            .unwrap_or(Some(0))
            .unwrap_or(0);
        let dlq_size: u64 = conn
            .llen("dead_letter")
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let _ = account_id; // per-account breakdown left to the stats roll-up in §6
        Ok(QueueStats {
            enqueued,
            completed,
            failed,
            dlq_size,
        })
    }
}
