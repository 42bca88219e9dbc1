//! Worker manager (C9): fleet-level reconciliation. Owns one `AccountWorker`
//! task per active account and drives the periodic jobs from §4.9 —
//! distribution, health check, DB sync, counter resets. Grounded on
//! `OutboundHub` (`im/daemon.rs`): a `DashMap` of per-entity handles,
//! spawn-on-demand, the manager itself stays a thin coordinator while each
//! handle's task does the real work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{RepoError, WorkerError};
use crate::model::{AccountStatus, TaskType};
use crate::queue::TaskQueueStore;
use crate::repo;
use crate::worker::{AccountWorker, WorkerDeps, WorkerHandle};

/// Spacing between successive worker starts during the initial fleet
/// bring-up, so the fleet doesn't open a burst of connections at once.
const STARTUP_SPACING: Duration = Duration::from_millis(500);
const INITIAL_SETTLE: Duration = Duration::from_secs(5);

const DISTRIBUTE_PERIOD: Duration = Duration::from_secs(30);
const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(60);
const DB_SYNC_PERIOD: Duration = Duration::from_secs(300);
const HOURLY_RESET_PERIOD: Duration = Duration::from_secs(3600);
const DAILY_RESET_PERIOD: Duration = Duration::from_secs(60);

const TARGETS_PER_DISTRIBUTION_ROUND: u32 = 100;

/// Snapshot surfaced by `get_stats()` (§6 "Operational signals") for one
/// running worker.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub account_id: Uuid,
    pub running: bool,
}

/// Fleet-wide stats roll-up.
#[derive(Debug, Clone, Default)]
pub struct FleetStats {
    pub workers: Vec<WorkerStats>,
}

/// Fleet-level reconciler. One instance per process; `run()` never returns
/// under normal operation.
pub struct WorkerManager {
    db: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    queue: Arc<dyn TaskQueueStore>,
    deps: WorkerDeps,
    workers: DashMap<Uuid, WorkerHandle>,
    max_fleet_size: u32,
}

impl WorkerManager {
    pub fn new(db: Arc<tokio::sync::Mutex<rusqlite::Connection>>, queue: Arc<dyn TaskQueueStore>, deps: WorkerDeps, max_fleet_size: u32) -> Self {
        Self {
            db,
            queue,
            deps,
            workers: DashMap::new(),
            max_fleet_size,
        }
    }

    /// §4.9 startup sequence: recover in-flight tasks, start one worker per
    /// eligible account with spacing, settle, then run the first
    /// distribution round.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let recovered = self.queue.recover_processing_tasks().await?;
        tracing::info!(recovered, "recovered in-flight tasks from processing sets");

        let accounts = {
            let conn = self.db.lock().await;
            repo::account::list_by_status(&conn, AccountStatus::Active)?
        };
        for account in accounts {
            if account.session_data.is_none() || account.campaign_id.is_none() {
                continue;
            }
            self.start_worker(account.meta.id);
            tokio::time::sleep(STARTUP_SPACING).await;
        }

        tokio::time::sleep(INITIAL_SETTLE).await;
        if let Err(e) = self.distribute_targets().await {
            tracing::warn!(error = %e, "initial target distribution failed");
        }
        Ok(())
    }

    /// Runs the periodic jobs forever. Intended to be the process's main
    /// loop after `start()`.
    pub async fn run(&self) -> ! {
        let mut distribute = tokio::time::interval(DISTRIBUTE_PERIOD);
        let mut health = tokio::time::interval(HEALTH_CHECK_PERIOD);
        let mut sync = tokio::time::interval(DB_SYNC_PERIOD);
        let mut hourly = tokio::time::interval(HOURLY_RESET_PERIOD);
        let mut daily = tokio::time::interval(DAILY_RESET_PERIOD);

        loop {
            tokio::select! {
                _ = distribute.tick() => {
                    if let Err(e) = self.distribute_targets().await {
                        tracing::warn!(error = %e, "target distribution failed");
                    }
                }
                _ = health.tick() => {
                    self.health_check().await;
                }
                _ = sync.tick() => {
                    if let Err(e) = self.sync_with_db().await {
                        tracing::warn!(error = %e, "db sync failed");
                    }
                }
                _ = hourly.tick() => {
                    if let Err(e) = self.reset_hourly_counters().await {
                        tracing::warn!(error = %e, "hourly reset failed");
                    }
                }
                _ = daily.tick() => {
                    if let Err(e) = self.reset_daily_counters().await {
                        tracing::warn!(error = %e, "daily reset failed");
                    }
                }
            }
        }
    }

    /// Spawns a worker task for `account_id` if one isn't already running.
    pub fn start_worker(&self, account_id: Uuid) {
        if self.workers.contains_key(&account_id) {
            return;
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = AccountWorker::new(account_id, self.deps.clone());
        let join = tokio::spawn(worker.run(stop_rx));
        self.workers.insert(account_id, WorkerHandle { account_id, stop_tx, join });
    }

    /// Signals the worker for `account_id` to stop and drops its handle. The
    /// worker's own `stop()` takes care of pausing the account in the DB.
    pub fn stop_worker(&self, account_id: Uuid) {
        if let Some((_, handle)) = self.workers.remove(&account_id) {
            let _ = handle.stop_tx.send(());
        }
    }

    fn running_account_ids(&self) -> Vec<Uuid> {
        self.workers.iter().map(|e| *e.key()).collect()
    }

    /// §4.9 "distribute targets": per-campaign round-robin over available
    /// workers, up to 100 pending targets per campaign per round.
    async fn distribute_targets(&self) -> Result<(), RepoError> {
        let running = self.running_account_ids();
        let campaigns = {
            let conn = self.db.lock().await;
            repo::campaign::list_active(&conn)?
        };

        for mut campaign in campaigns {
            if !campaign.sending.can_send_batch(chrono::Utc::now()) {
                continue;
            }

            let available: Vec<Uuid> = {
                let conn = self.db.lock().await;
                let mut ids = Vec::new();
                for account_id in &running {
                    if !campaign.account_ids.contains(account_id) {
                        continue;
                    }
                    if let Some(account) = repo::account::get(&conn, *account_id)? {
                        if account.status == AccountStatus::Active && account.can_start_new_conversation(chrono::Utc::now()) {
                            ids.push(*account_id);
                        }
                    }
                }
                ids
            };
            if available.is_empty() {
                continue;
            }

            let targets = {
                let conn = self.db.lock().await;
                repo::target::list_pending(&conn, campaign.meta.id, TARGETS_PER_DISTRIBUTION_ROUND)?
            };
            if targets.is_empty() {
                continue;
            }

            for (i, mut target) in targets.into_iter().enumerate() {
                let account_id = available[i % available.len()];
                let mut task = crate::model::Task::new(TaskType::SendFirstMessage, account_id, campaign.meta.id);
                task.target_id = Some(target.meta.id);
                if let Err(e) = self.queue.enqueue(task, false).await {
                    tracing::warn!(error = %e, target_id = %target.meta.id, "failed to enqueue first-message task");
                    continue;
                }
                target.assign_to_account(account_id);
                let conn = self.db.lock().await;
                repo::target::save(&conn, &mut target)?;
            }

            campaign.sending.record_batch_sent();
            let conn = self.db.lock().await;
            let _ = repo::campaign::save(&conn, &mut campaign);
        }
        Ok(())
    }

    /// §4.9 "health check": restart any worker whose run-loop task ended
    /// unexpectedly, from a fresh DB snapshot.
    async fn health_check(&self) {
        let dead: Vec<Uuid> = self
            .workers
            .iter()
            .filter(|e| e.join.is_finished())
            .map(|e| *e.key())
            .collect();

        for account_id in dead {
            self.workers.remove(&account_id);
            let status = {
                let conn = self.db.lock().await;
                repo::account::get(&conn, account_id).ok().flatten().map(|a| a.status)
            };
            if status == Some(AccountStatus::Active) {
                tracing::warn!(%account_id, "worker exited unexpectedly, restarting");
                self.start_worker(account_id);
            }
        }
    }

    /// §4.9 "sync with DB": stop workers for deactivated accounts, start
    /// workers for newly-activated ones, respecting `max_fleet_size`.
    async fn sync_with_db(&self) -> Result<(), RepoError> {
        let active = {
            let conn = self.db.lock().await;
            repo::account::list_by_status(&conn, AccountStatus::Active)?
        };
        let active_ids: std::collections::HashSet<Uuid> = active.iter().map(|a| a.meta.id).collect();

        for account_id in self.running_account_ids() {
            if !active_ids.contains(&account_id) {
                self.stop_worker(account_id);
            }
        }

        let mut room = self.max_fleet_size as usize - self.workers.len().min(self.max_fleet_size as usize);
        for account in active {
            if room == 0 {
                break;
            }
            if self.workers.contains_key(&account.meta.id) {
                continue;
            }
            if account.session_data.is_none() || account.campaign_id.is_none() {
                continue;
            }
            self.start_worker(account.meta.id);
            room -= 1;
        }
        Ok(())
    }

    async fn reset_hourly_counters(&self) -> Result<(), RepoError> {
        let conn = self.db.lock().await;
        let mut accounts = repo::account::list_all(&conn)?;
        let due: Vec<usize> = accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.hourly_messages_count > 0 || a.hourly_responses_count > 0)
            .map(|(i, _)| i)
            .collect();
        let touched = crate::rate::reset_hourly_counters(accounts.iter_mut());
        for i in due {
            let _ = repo::account::save(&conn, &mut accounts[i]);
        }
        tracing::debug!(touched, "hourly counters reset");
        Ok(())
    }

    async fn reset_daily_counters(&self) -> Result<(), RepoError> {
        let conn = self.db.lock().await;
        let mut accounts = repo::account::list_all(&conn)?;
        let now = chrono::Utc::now();
        let due: Vec<usize> = accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.due_for_daily_reset(now))
            .map(|(i, _)| i)
            .collect();
        let touched = crate::rate::reset_daily_counters(accounts.iter_mut(), now);
        for i in due {
            let _ = repo::account::save(&conn, &mut accounts[i]);
        }
        tracing::debug!(touched, "daily counters reset");
        Ok(())
    }

    /// §6 "Operational signals": per-worker running state plus queue stats,
    /// keyed by account.
    pub async fn get_stats(&self) -> FleetStats {
        let workers = self
            .workers
            .iter()
            .map(|e| WorkerStats {
                account_id: *e.key(),
                running: !e.join.is_finished(),
            })
            .collect();
        FleetStats { workers }
    }

    pub async fn queue_stats_by_account(&self) -> HashMap<Uuid, crate::queue::QueueStats> {
        let mut out = HashMap::new();
        for account_id in self.running_account_ids() {
            if let Ok(stats) = self.queue.stats(account_id).await {
                out.insert(account_id, stats);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;
    use crate::dialogue::llm::{ChatMessage, GenerateRequest, GenerateResponse, LlmProvider};
    use crate::error::{LlmError, TelegramError};
    use crate::model::{Account, AccountSource};
    use crate::queue::InMemoryTaskQueueStore;
    use crate::telegram::{ClientConfig, TelegramClient};
    use crate::vault::{SessionVault, StringSession};
    use crate::worker::ClientConnector;
    use async_trait::async_trait;

    struct StubConnector;
    #[async_trait]
    impl ClientConnector for StubConnector {
        async fn connect(&self, _cfg: ClientConfig, _session: StringSession, _proxy_url: &str) -> Result<Arc<dyn TelegramClient>, TelegramError> {
            Err(TelegramError::Network("no transport in tests".into()))
        }
    }

    struct StubLlm;
    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn generate(&self, _req: GenerateRequest<'_>) -> Result<GenerateResponse, LlmError> {
            Err(LlmError::Provider("stub".into()))
        }
    }

    fn test_deps(db: Arc<tokio::sync::Mutex<rusqlite::Connection>>) -> WorkerDeps {
        WorkerDeps {
            db,
            queue: Arc::new(InMemoryTaskQueueStore::new()),
            proxies: Arc::new(crate::proxy::ProxyRegistry::new(Box::new(NoopChecker))),
            connector: Arc::new(StubConnector),
            llm: Arc::new(StubLlm),
            vault: Arc::new(SessionVault::new(&[0u8; 32])),
            config: Box::leak(Box::new(crate::config::Config::default())),
        }
    }

    struct NoopChecker;
    #[async_trait]
    impl crate::proxy::ProxyChecker for NoopChecker {
        async fn check(&self, _proxy: &crate::model::Proxy) -> Result<u32, crate::error::ProxyError> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn sync_stops_worker_for_deactivated_account() {
        let conn = open_memory().unwrap();
        let mut account = Account::new("+1555".into(), AccountSource::Phone);
        account.status = AccountStatus::Paused;
        repo::account::create(&conn, &account).unwrap();
        let db = Arc::new(tokio::sync::Mutex::new(conn));

        let manager = WorkerManager::new(db.clone(), Arc::new(InMemoryTaskQueueStore::new()), test_deps(db.clone()), 10);
        manager.workers.insert(
            account.meta.id,
            WorkerHandle {
                account_id: account.meta.id,
                stop_tx: oneshot::channel().0,
                join: tokio::spawn(async { Ok(()) }),
            },
        );

        manager.sync_with_db().await.unwrap();
        assert!(!manager.workers.contains_key(&account.meta.id));
    }

    #[tokio::test]
    async fn health_check_restarts_active_account_with_dead_worker() {
        let conn = open_memory().unwrap();
        let mut account = Account::new("+1555".into(), AccountSource::Phone);
        account.status = AccountStatus::Active;
        repo::account::create(&conn, &account).unwrap();
        let db = Arc::new(tokio::sync::Mutex::new(conn));

        let manager = WorkerManager::new(db.clone(), Arc::new(InMemoryTaskQueueStore::new()), test_deps(db.clone()), 10);
        let (stop_tx, _stop_rx) = oneshot::channel();
        manager.workers.insert(
            account.meta.id,
            WorkerHandle {
                account_id: account.meta.id,
                stop_tx,
                join: tokio::spawn(async { Ok(()) }),
            },
        );
        tokio::task::yield_now().await;

        manager.health_check().await;
        assert!(manager.workers.contains_key(&account.meta.id));
    }
}
