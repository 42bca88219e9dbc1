//! In-memory `TaskQueueStore` for tests — a real `VecDeque` FIFO per
//! account, no network, same semantics as the Redis store.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::Task;

use super::{backoff_seconds, QueueStats, TaskQueueStore};

#[derive(Default)]
struct AccountQueue {
    queue: VecDeque<Task>,
    processing: HashMap<Uuid, Task>,
    enqueued: u64,
    completed: u64,
    failed: u64,
}

pub struct InMemoryTaskQueueStore {
    accounts: Mutex<HashMap<Uuid, AccountQueue>>,
    dead_letter: Mutex<Vec<Task>>,
}

impl InMemoryTaskQueueStore {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            dead_letter: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryTaskQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueueStore for InMemoryTaskQueueStore {
    async fn enqueue(&self, task: Task, priority: bool) -> Result<(), QueueError> {
        let mut accounts = self.accounts.lock().unwrap();
        let entry = accounts.entry(task.account_id).or_default();
        if priority {
            entry.queue.push_front(task);
        } else {
            entry.queue.push_back(task);
        }
        entry.enqueued += 1;
        Ok(())
    }

    async fn dequeue(&self, account_id: Uuid, _timeout: Duration) -> Result<Option<Task>, QueueError> {
        let mut accounts = self.accounts.lock().unwrap();
        let entry = accounts.entry(account_id).or_default();
        let Some(task) = entry.queue.pop_front() else {
            return Ok(None);
        };
        entry.processing.insert(task.id, task.clone());
        Ok(Some(task))
    }

    async fn complete(&self, task: &Task) -> Result<(), QueueError> {
        let mut accounts = self.accounts.lock().unwrap();
        let entry = accounts.entry(task.account_id).or_default();
        entry
            .processing
            .remove(&task.id)
            .ok_or_else(|| QueueError::NotInProcessing(task.id.to_string()))?;
        entry.completed += 1;
        Ok(())
    }

    async fn fail(&self, mut task: Task, error: String, retry: bool) -> Result<(), QueueError> {
        {
            let mut accounts = self.accounts.lock().unwrap();
            let entry = accounts.entry(task.account_id).or_default();
            entry.processing.remove(&task.id);
        }
        task.last_error = Some(error);

        if retry && task.retry_count < task.max_retries {
            let delay = backoff_seconds(task.retry_count);
            task.retry_count += 1;
            tokio::time::sleep(Duration::from_secs(delay)).await;
            self.enqueue(task, true).await
        } else {
            let mut accounts = self.accounts.lock().unwrap();
            accounts.entry(task.account_id).or_default().failed += 1;
            self.dead_letter.lock().unwrap().push(task);
            Ok(())
        }
    }

    async fn recover_processing_tasks(&self) -> Result<usize, QueueError> {
        let mut accounts = self.accounts.lock().unwrap();
        let mut recovered = 0;
        for entry in accounts.values_mut() {
            let stale: Vec<Task> = entry.processing.drain().map(|(_, t)| t).collect();
            recovered += stale.len();
            for task in stale.into_iter().rev() {
                entry.queue.push_front(task);
            }
        }
        Ok(recovered)
    }

    async fn stats(&self, account_id: Uuid) -> Result<QueueStats, QueueError> {
        let accounts = self.accounts.lock().unwrap();
        let dlq_size = self
            .dead_letter
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.account_id == account_id)
            .count() as u64;
        Ok(accounts
            .get(&account_id)
            .map(|e| QueueStats {
                enqueued: e.enqueued,
                completed: e.completed,
                failed: e.failed,
                dlq_size,
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskType;

    fn task(account: Uuid) -> Task {
        Task::new(TaskType::SendFirstMessage, account, Uuid::new_v4())
    }

    #[tokio::test]
    async fn fifo_order_preserved_within_account() {
        let store = InMemoryTaskQueueStore::new();
        let account = Uuid::new_v4();
        let t1 = task(account);
        let t2 = task(account);
        let id1 = t1.id;
        let id2 = t2.id;
        store.enqueue(t1, false).await.unwrap();
        store.enqueue(t2, false).await.unwrap();
        let first = store.dequeue(account, Duration::from_secs(1)).await.unwrap().unwrap();
        let second = store.dequeue(account, Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.id, id1);
        assert_eq!(second.id, id2);
    }

    #[tokio::test]
    async fn priority_push_jumps_the_queue() {
        let store = InMemoryTaskQueueStore::new();
        let account = Uuid::new_v4();
        let normal = task(account);
        let retried = task(account);
        let retried_id = retried.id;
        store.enqueue(normal, false).await.unwrap();
        store.enqueue(retried, true).await.unwrap();
        let first = store.dequeue(account, Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.id, retried_id);
    }

    #[tokio::test]
    async fn recover_processing_requeues_in_flight_tasks_once() {
        let store = InMemoryTaskQueueStore::new();
        let account = Uuid::new_v4();
        store.enqueue(task(account), false).await.unwrap();
        let dequeued = store.dequeue(account, Duration::from_secs(1)).await.unwrap().unwrap();
        let recovered = store.recover_processing_tasks().await.unwrap();
        assert_eq!(recovered, 1);
        let again = store.dequeue(account, Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(again.id, dequeued.id);
        // second recovery pass finds nothing left in-flight
        assert_eq!(store.recover_processing_tasks().await.unwrap(), 0);
    }
}
