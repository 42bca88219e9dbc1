//! Message batcher (C5): per-(account, user) debounce buffer that collapses
//! bursts of incoming messages into one logical turn. Grounded on the
//! teacher's `im/daemon.rs` debounce-timer pattern (reset-on-activity timer
//! racing a hard ceiling), generalized from "one timer" to "one timer per
//! (account, user) key".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

/// Debounce window: a burst of messages arriving within this long of each
/// other collapses into one flush.
const DEBOUNCE: Duration = Duration::from_secs(3);

/// Hard ceiling from the first buffered message, regardless of continued
/// typing.
const MAX_DELAY: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct BufferedTurn {
    pub account_id: Uuid,
    pub user_key: String,
    pub text: String,
    pub telegram_message_ids: Vec<i64>,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
struct BatchKey {
    account_id: Uuid,
    user_key_hash: u64,
}

struct PendingBatch {
    parts: Vec<String>,
    ids: Vec<i64>,
    user_key: String,
    first_seen: Instant,
    generation: u64,
}

/// Callback-driven flush: each expired or ceiling-hit batch is sent down a
/// channel for the worker's inbound loop to pick up. A direct callback
/// closure (as the real system uses) is awkward across `tokio::spawn`
/// boundaries in safe Rust, so the channel plays the same role.
pub struct MessageBatcher {
    pending: Arc<Mutex<HashMap<BatchKey, PendingBatch>>>,
    tx: mpsc::UnboundedSender<BufferedTurn>,
}

impl MessageBatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BufferedTurn>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Arc::new(Mutex::new(HashMap::new())),
                tx,
            },
            rx,
        )
    }

    fn key(account_id: Uuid, user_key: &str) -> BatchKey {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        user_key.hash(&mut hasher);
        BatchKey {
            account_id,
            user_key_hash: hasher.finish(),
        }
    }

    /// Appends `text`/`telegram_message_id` to the buffer for
    /// `(account_id, user_key)`, (re)starting its debounce timer. The timer
    /// fires after `DEBOUNCE` of inactivity, or unconditionally at
    /// `first_seen + MAX_DELAY`, whichever comes first.
    pub async fn push(&self, account_id: Uuid, user_key: &str, text: String, telegram_message_id: i64) {
        let key = Self::key(account_id, user_key);
        let generation = {
            let mut pending = self.pending.lock().await;
            let batch = pending.entry(key).or_insert_with(|| PendingBatch {
                parts: Vec::new(),
                ids: Vec::new(),
                user_key: user_key.to_string(),
                first_seen: Instant::now(),
                generation: 0,
            });
            batch.parts.push(text);
            batch.ids.push(telegram_message_id);
            batch.generation += 1;
            batch.generation
        };

        let pending = self.pending.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            Self::try_flush(pending, tx, key, generation).await;
        });

        // Arm the hard ceiling once, at first-message time, by checking
        // inside try_flush whether `first_seen + MAX_DELAY` has elapsed;
        // a dedicated ceiling task guarantees it fires even under a
        // continuous stream of debounce resets.
        if generation == 1 {
            let pending = self.pending.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(MAX_DELAY).await;
                Self::force_flush(pending, tx, key).await;
            });
        }
    }

    /// Fires `DEBOUNCE` after the *last* push for this key. If another push
    /// arrived since (detected by `generation` mismatch), this is a stale
    /// timer and does nothing — the newer timer will flush instead.
    async fn try_flush(
        pending: Arc<Mutex<HashMap<BatchKey, PendingBatch>>>,
        tx: mpsc::UnboundedSender<BufferedTurn>,
        key: BatchKey,
        generation: u64,
    ) {
        let mut guard = pending.lock().await;
        let Some(batch) = guard.get(&key) else { return };
        if batch.generation != generation {
            return;
        }
        let batch = guard.remove(&key).unwrap();
        drop(guard);
        Self::emit(tx, key.account_id, batch);
    }

    /// Unconditional flush at the hard ceiling, whatever state the buffer is
    /// in, as long as it still exists (a normal debounce flush may have
    /// already drained it).
    async fn force_flush(
        pending: Arc<Mutex<HashMap<BatchKey, PendingBatch>>>,
        tx: mpsc::UnboundedSender<BufferedTurn>,
        key: BatchKey,
    ) {
        let mut guard = pending.lock().await;
        let Some(batch) = guard.remove(&key) else { return };
        drop(guard);
        Self::emit(tx, key.account_id, batch);
    }

    fn emit(tx: mpsc::UnboundedSender<BufferedTurn>, account_id: Uuid, batch: PendingBatch) {
        let text = batch.parts.join("\n");
        let _ = tx.send(BufferedTurn {
            account_id,
            user_key: batch.user_key,
            text,
            telegram_message_ids: batch.ids,
        });
    }

    /// Drops every pending batch without flushing it — called on worker
    /// stop so in-flight debounce timers don't emit after shutdown.
    pub async fn cancel_all(&self) {
        self.pending.lock().await.clear();
    }
}

impl Default for MessageBatcher {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_within_debounce_collapses_to_one_turn() {
        let (batcher, mut rx) = MessageBatcher::new();
        let account = Uuid::new_v4();
        batcher.push(account, "user1", "привет".into(), 1).await;
        tokio::time::advance(Duration::from_millis(500)).await;
        batcher.push(account, "user1", "как дела".into(), 2).await;
        tokio::time::advance(DEBOUNCE + Duration::from_millis(100)).await;

        let turn = rx.recv().await.unwrap();
        assert_eq!(turn.text, "привет\nкак дела");
        assert_eq!(turn.telegram_message_ids, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_ceiling_flushes_despite_continued_activity() {
        let (batcher, mut rx) = MessageBatcher::new();
        let account = Uuid::new_v4();
        batcher.push(account, "user1", "a".into(), 1).await;
        // Keep resetting the debounce timer every 2s, never letting it fire,
        // but the 15s ceiling must still force a flush.
        for i in 2..8 {
            tokio::time::advance(Duration::from_secs(2)).await;
            batcher.push(account, "user1", format!("part{i}"), i).await;
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        let turn = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("ceiling must force a flush")
            .unwrap();
        assert_eq!(turn.telegram_message_ids[0], 1);
    }

    #[tokio::test]
    async fn cancel_all_suppresses_pending_flush() {
        let (batcher, mut rx) = MessageBatcher::new();
        let account = Uuid::new_v4();
        batcher.push(account, "user1", "hi".into(), 1).await;
        batcher.cancel_all().await;
        let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(result.is_err(), "no turn should have been emitted after cancel_all");
    }
}
