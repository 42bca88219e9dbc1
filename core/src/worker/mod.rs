//! Account worker (C8): one logical actor per account, owning exactly one
//! `TelegramClient` connection. Grounded on `im/worker.rs`'s run-loop shape
//! (own task, own cancellation channel, the manager restarts it on exit)
//! generalized from "one IM channel" to "one Telegram account", and on
//! `im/daemon.rs`'s per-entity mutex map for the per-dialogue lock.

pub mod background;
pub mod warmup;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::batcher::MessageBatcher;
use crate::config::Config;
use crate::dialogue::llm::LlmProvider;
use crate::dialogue::pipeline::{self, TerminationReason};
use crate::error::{TelegramError, WorkerError};
use crate::model::{Account, AccountStatus, Dialogue, DialogueStatus, MessageRole, Task, TaskType, UserTarget};
use crate::proxy::ProxyRegistry;
use crate::queue::TaskQueueStore;
use crate::repo;
use crate::telegram::{ClientConfig, DeviceFingerprint, IncomingMessage, Recipient, TelegramClient};
use crate::vault::{SessionVault, StringSession};

/// Builds a connected [`TelegramClient`] for one account, so the worker can
/// retry through a different proxy without knowing which concrete transport
/// backs the trait object (and so tests can inject a stub).
#[async_trait]
pub trait ClientConnector: Send + Sync {
    async fn connect(
        &self,
        cfg: ClientConfig,
        session: StringSession,
        proxy_url: &str,
    ) -> Result<Arc<dyn TelegramClient>, TelegramError>;
}

pub struct GrammersConnector;

#[async_trait]
impl ClientConnector for GrammersConnector {
    async fn connect(
        &self,
        cfg: ClientConfig,
        session: StringSession,
        proxy_url: &str,
    ) -> Result<Arc<dyn TelegramClient>, TelegramError> {
        let client = crate::telegram::client::GrammersTelegramClient::connect(cfg, session, proxy_url).await?;
        Ok(Arc::new(client))
    }
}

/// Shared, cloneable dependencies every worker needs. One instance is built
/// by the manager and handed to each spawned worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub db: Arc<Mutex<rusqlite::Connection>>,
    pub queue: Arc<dyn TaskQueueStore>,
    pub proxies: Arc<ProxyRegistry>,
    pub connector: Arc<dyn ClientConnector>,
    pub llm: Arc<dyn LlmProvider>,
    pub vault: Arc<SessionVault>,
    pub config: &'static Config,
}

/// Handle the manager keeps per running worker: how to ask it to stop, and
/// the join handle to detect an unexpected exit (§4.9's health-check job).
pub struct WorkerHandle {
    pub account_id: Uuid,
    pub stop_tx: oneshot::Sender<()>,
    pub join: tokio::task::JoinHandle<Result<(), WorkerError>>,
}

const MAX_START_ATTEMPTS: u32 = 4;
const DIALOGUE_MAP_EVICT_AT: usize = 500;

pub struct AccountWorker {
    account_id: Uuid,
    deps: WorkerDeps,
    client: Option<Arc<dyn TelegramClient>>,
    dialogue_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
    batcher: MessageBatcher,
    batch_rx: mpsc::UnboundedReceiver<crate::batcher::BufferedTurn>,
    inbound_tx: mpsc::UnboundedSender<IncomingMessage>,
    inbound_rx: mpsc::UnboundedReceiver<IncomingMessage>,
    bg_stop: Option<tokio::sync::watch::Sender<bool>>,
    warmup: Option<crate::model::AccountWarmup>,
}

impl AccountWorker {
    pub fn new(account_id: Uuid, deps: WorkerDeps) -> Self {
        let (batcher, batch_rx) = MessageBatcher::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            account_id,
            deps,
            client: None,
            dialogue_locks: Arc::new(Mutex::new(HashMap::new())),
            batcher,
            batch_rx,
            inbound_tx,
            inbound_rx,
            bg_stop: None,
            warmup: None,
        }
    }

    /// Runs the worker until `stop_rx` fires or an unrecoverable error exits
    /// the main loop. The manager spawns this as its own task and watches
    /// the returned `Result` for the health-check job.
    pub async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> Result<(), WorkerError> {
        self.start().await?;

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    self.stop().await;
                    return Ok(());
                }
                turn = self.batch_rx.recv() => {
                    if let Some(turn) = turn {
                        if let Err(e) = self.handle_buffered_turn(turn).await {
                            tracing::warn!(account_id = %self.account_id, error = %e, "inbound turn failed");
                        }
                    }
                }
                incoming = self.inbound_rx.recv() => {
                    if let Some(msg) = incoming {
                        self.batcher
                            .push(self.account_id, &incoming_key(&msg), msg.text.clone(), msg.telegram_message_id)
                            .await;
                    }
                }
                result = self.main_loop_tick() => {
                    if let Err(e) = result {
                        tracing::warn!(account_id = %self.account_id, error = %e, "worker loop tick failed, attempting failover");
                        if self.failover().await.is_err() {
                            self.stop().await;
                            return Err(e);
                        }
                    }
                    let interval = rand::thread_rng().gen_range(8.0..15.0);
                    tokio::time::sleep(Duration::from_secs_f64(interval)).await;
                }
            }
        }
    }

    /// §4.8 start sequence: fetch proxy/app, connect with up to 4 failover
    /// attempts, register the inbound handler, mark the account active.
    async fn start(&mut self) -> Result<(), WorkerError> {
        let account = self.load_account().await?;

        if let Some(last) = account.last_activity {
            let elapsed = chrono::Utc::now().signed_duration_since(last);
            if elapsed < chrono::Duration::seconds(30) {
                let residual = 30 - elapsed.num_seconds().max(0);
                tokio::time::sleep(Duration::from_secs(residual as u64)).await;
            }
        }

        let app_id = account.telegram_app_id.ok_or(WorkerError::NoProxy)?;
        let app = {
            let conn = self.deps.db.lock().await;
            repo::telegram_app::get(&conn, app_id)?.ok_or(WorkerError::NoProxy)?
        };
        let session_bytes = account.session_data.clone().ok_or(WorkerError::NoProxy)?;
        let session = self
            .deps
            .vault
            .decrypt(&session_bytes)
            .ok()
            .and_then(|plain| crate::vault::normalize_session(&plain).ok())
            .ok_or(WorkerError::NoProxy)?;

        let device = DeviceFingerprint::generate(self.account_id, chrono::Utc::now().date_naive());
        let cfg = ClientConfig {
            account_id: self.account_id,
            api_id: app.api_id,
            api_hash: app.api_hash.clone(),
            device,
        };

        let mut excluded: Vec<Uuid> = Vec::new();
        let mut last_err = None;
        for _ in 0..MAX_START_ATTEMPTS {
            let proxy = match self.deps.proxies.get_for_account(self.account_id) {
                Some(p) if !excluded.contains(&p.meta.id) => p,
                _ => self
                    .deps
                    .proxies
                    .acquire_excluding(self.account_id, &excluded)
                    .map_err(|_| WorkerError::NoProxy)?,
            };
            let proxy_url = format!("{}://{}", proxy_scheme(proxy.proxy_type), proxy.address());

            match self.deps.connector.connect(cfg.clone(), session.clone(), &proxy_url).await {
                Ok(client) => {
                    self.client = Some(client.clone());
                    let tx = self.inbound_tx.clone();
                    client.on_message(Box::new(move |msg| {
                        let _ = tx.send(msg);
                    }));
                    self.mark_active().await?;
                    self.spawn_background_loop(client.clone());
                    if account.status == AccountStatus::Inactive {
                        self.warmup = Some(crate::model::AccountWarmup::new(self.account_id, None));
                        if let Some(w) = self.warmup.as_mut() {
                            w.start();
                        }
                    }
                    return Ok(());
                }
                Err(e) if e.is_auth_class() => {
                    self.mark_error(&e.to_string()).await?;
                    return Err(WorkerError::Telegram(e));
                }
                Err(e) => {
                    self.deps.proxies.mark_failed(proxy.meta.id);
                    excluded.push(proxy.meta.id);
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or(TelegramError::Network("no proxy candidates".into()));
        self.mark_error(&err.to_string()).await?;
        Err(WorkerError::Telegram(err))
    }

    async fn mark_active(&self) -> Result<(), WorkerError> {
        let conn = self.deps.db.lock().await;
        let mut account = repo::account::get(&conn, self.account_id)?.ok_or(WorkerError::NoProxy)?;
        account.activate().map_err(WorkerError::AccountError)?;
        account.last_activity = Some(chrono::Utc::now());
        repo::account::save(&conn, &mut account)?;
        Ok(())
    }

    async fn mark_error(&self, message: &str) -> Result<(), WorkerError> {
        let conn = self.deps.db.lock().await;
        if let Some(mut account) = repo::account::get(&conn, self.account_id)? {
            account.set_error(message);
            repo::account::save(&conn, &mut account)?;
        }
        Ok(())
    }

    async fn load_account(&self) -> Result<Account, WorkerError> {
        let conn = self.deps.db.lock().await;
        repo::account::get(&conn, self.account_id)?.ok_or(WorkerError::NoProxy)
    }

    /// Single proxy failover attempt used when the main loop hits a
    /// transient network error; on success the existing client is replaced.
    async fn failover(&mut self) -> Result<(), WorkerError> {
        self.client = None;
        self.start().await
    }

    /// One tick of the §4.8 main task loop: refresh snapshot, respect sleep
    /// window, run queued outreach and due follow-ups.
    async fn main_loop_tick(&mut self) -> Result<(), WorkerError> {
        let account = self.load_account().await?;
        if account.status != AccountStatus::Active {
            return Ok(());
        }
        if account.schedule.is_sleeping(account.meta.id, chrono::Utc::now()) {
            let sleep_secs = rand::thread_rng().gen_range(300.0..900.0);
            tokio::time::sleep(Duration::from_secs_f64(sleep_secs)).await;
            return Ok(());
        }

        if self.maybe_run_warmup_cycle().await {
            return Ok(());
        }

        if account.can_start_new_conversation(chrono::Utc::now()) {
            if let Some(task) = self.deps.queue.dequeue(self.account_id, Duration::from_millis(50)).await? {
                self.process_task(task).await?;
            }
        }

        let due = {
            let conn = self.deps.db.lock().await;
            repo::dialogue::list_due(&conn, self.account_id, chrono::Utc::now())?
        };
        for dialogue in due {
            if dialogue.status == DialogueStatus::Active || dialogue.status == DialogueStatus::Initiated {
                self.process_follow_up(dialogue.meta.id).await?;
            }
        }
        Ok(())
    }

    async fn process_task(&mut self, task: Task) -> Result<(), WorkerError> {
        let dialogue_id = task.dialogue_id.unwrap_or_default();
        let lock = self.dialogue_lock(dialogue_id).await;
        let _guard = lock.lock().await;

        let result = match task.task_type {
            TaskType::SendFirstMessage => self.send_first_message(&task).await,
            TaskType::SendFollowUp => self.send_follow_up(&task).await,
            TaskType::SendResponse => Ok(()),
        };

        match result {
            Ok(()) => self.deps.queue.complete(&task).await.map_err(WorkerError::from),
            Err(e) => {
                let retry = !matches!(&e, WorkerError::Telegram(te) if matches!(te, TelegramError::Privacy));
                self.deps.queue.fail(task, e.to_string(), retry).await?;
                Ok(())
            }
        }
    }

    async fn send_first_message(&self, task: &Task) -> Result<(), WorkerError> {
        let Some(target_id) = task.target_id else { return Ok(()) };
        let (mut target, account) = {
            let conn = self.deps.db.lock().await;
            let target = repo::target::get(&conn, target_id)?.ok_or(WorkerError::NoProxy)?;
            let account = repo::account::get(&conn, self.account_id)?.ok_or(WorkerError::NoProxy)?;
            (target, account)
        };
        if !account.can_start_new_conversation(chrono::Utc::now()) {
            return Err(WorkerError::AccountError("cannot start new conversation".into()));
        }

        let pause = rand::thread_rng().gen_range(30.0..120.0);
        tokio::time::sleep(Duration::from_secs_f64(pause)).await;

        let telegram_user_id = target.telegram_id.unwrap_or(0);
        let mut dialogue = Dialogue::new(self.account_id, task.campaign_id, target_id, telegram_user_id);
        dialogue.telegram_username = target.username.clone();
        dialogue.mark_initiated();

        let text = pipeline::first_message();
        let parts: Vec<String> = text.split("|||").map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect();
        let _ = dialogue.add_message(MessageRole::Account, text.clone(), None, false, 0, false);

        let recipient = recipient_for(&target);
        let typing_times: Vec<Duration> = parts.iter().map(|p| typing_time_for(p)).collect();
        let client = self.client.clone().ok_or(WorkerError::NoProxy)?;
        let send = client
            .send_messages_natural(&recipient, &parts, &typing_times, Duration::from_secs(1))
            .await;

        let conn = self.deps.db.lock().await;
        match send {
            Ok(ids) => {
                if let Some(last) = dialogue.messages.last_mut() {
                    last.telegram_message_id = ids.last().copied();
                }
                let mut account = repo::account::get(&conn, self.account_id)?.ok_or(WorkerError::NoProxy)?;
                account.record_new_conversation();
                account.record_message_sent();
                repo::account::save(&conn, &mut account)?;

                target.assign_to_account(self.account_id);
                target.mark_contacted(Some(dialogue.meta.id));
                repo::target::save(&conn, &mut target)?;
                repo::dialogue::create(&conn, &dialogue)?;
                Ok(())
            }
            Err(e) if matches!(e, TelegramError::Privacy) => {
                dialogue.mark_failed("privacy_settings");
                target.mark_failed("privacy_settings");
                repo::target::save(&conn, &mut target)?;
                repo::dialogue::create(&conn, &dialogue)?;
                Ok(())
            }
            Err(e) => Err(WorkerError::Telegram(e)),
        }
    }

    async fn send_follow_up(&self, task: &Task) -> Result<(), WorkerError> {
        let Some(dialogue_id) = task.dialogue_id else { return Ok(()) };
        self.process_follow_up(dialogue_id).await
    }

    async fn process_follow_up(&self, dialogue_id: Uuid) -> Result<(), WorkerError> {
        const FOLLOW_UP_BACKOFF_HOURS: [i64; 3] = [24, 48, 96];
        let (mut dialogue, campaign) = {
            let conn = self.deps.db.lock().await;
            let Some(dialogue) = repo::dialogue::get(&conn, dialogue_id)? else { return Ok(()) };
            let campaign = repo::campaign::get(&conn, dialogue.campaign_id)?.ok_or(WorkerError::NoProxy)?;
            (dialogue, campaign)
        };
        if dialogue.status.is_terminal() {
            return Ok(());
        }

        let count = dialogue.follow_up_count();
        if !campaign.sending.follow_up_enabled || count >= FOLLOW_UP_BACKOFF_HOURS.len() {
            dialogue.mark_expired();
            let conn = self.deps.db.lock().await;
            repo::dialogue::save(&conn, &mut dialogue, false)?;
            if let Some(mut target) = repo::target::get(&conn, dialogue.target_user_id)? {
                target.mark_failed("follow_up_exhausted");
                repo::target::save(&conn, &mut target)?;
            }
            return Ok(());
        }

        let temperature = (campaign.ai.temperature + 0.1).min(1.0);
        let system_prompt = campaign.system_prompt();
        let request = crate::dialogue::llm::GenerateRequest {
            system_prompt: &system_prompt,
            history: dialogue
                .conversation_history(8)
                .into_iter()
                .map(|(role, content)| crate::dialogue::llm::ChatMessage { role, content: content.to_string() })
                .collect(),
            model: &campaign.ai.model,
            temperature,
            max_tokens: campaign.ai.max_tokens,
        };
        let response = crate::dialogue::llm::generate_with_fallback(self.deps.llm.as_ref(), request, None)
            .await
            .map_err(WorkerError::from)?;
        let parsed = crate::dialogue::parser::parse(&response.content);
        let parts: Vec<String> = parsed.messages.iter().map(|m| crate::dialogue::humanizer::humanize_text(m)).collect();
        if parts.is_empty() {
            return Ok(());
        }
        let joined = parts.join(" ");
        let _ = dialogue.add_message(MessageRole::Account, joined, None, true, response.total_tokens, true);
        dialogue.next_action_at = Some(
            chrono::Utc::now() + chrono::Duration::hours(FOLLOW_UP_BACKOFF_HOURS[count]),
        );

        let recipient = Recipient::Id(dialogue.telegram_user_id);
        let typing_times: Vec<Duration> = parts.iter().map(|p| typing_time_for(p)).collect();
        let client = self.client.clone().ok_or(WorkerError::NoProxy)?;
        let ids = client
            .send_messages_natural(&recipient, &parts, &typing_times, Duration::from_secs(1))
            .await
            .map_err(WorkerError::from)?;
        if let Some(last) = dialogue.messages.last_mut() {
            last.telegram_message_id = ids.last().copied();
        }

        let conn = self.deps.db.lock().await;
        repo::dialogue::save(&conn, &mut dialogue, false)?;
        Ok(())
    }

    /// §4.8 inbound handling: run the pipeline, apply the reading delay,
    /// send each part naturally, record side effects.
    async fn handle_buffered_turn(&self, turn: crate::batcher::BufferedTurn) -> Result<(), WorkerError> {
        let Ok(sender_id) = turn.user_key.parse::<i64>() else { return Ok(()) };
        let dialogue_id = {
            let conn = self.deps.db.lock().await;
            repo::dialogue::list_by_account(&conn, self.account_id)?
                .into_iter()
                .find(|d| !d.status.is_terminal() && d.telegram_user_id == sender_id)
                .map(|d| d.meta.id)
        };
        let Some(dialogue_id) = dialogue_id else { return Ok(()) };

        let lock = self.dialogue_lock(dialogue_id).await;
        let _guard = lock.lock().await;

        let (mut dialogue, mut campaign) = {
            let conn = self.deps.db.lock().await;
            let Some(dialogue) = repo::dialogue::get(&conn, dialogue_id)? else { return Ok(()) };
            let campaign = repo::campaign::get(&conn, dialogue.campaign_id)?.ok_or(WorkerError::NoProxy)?;
            (dialogue, campaign)
        };
        if dialogue.status.is_terminal() {
            return Ok(());
        }

        let outcome = pipeline::process_inbound_turn(&mut dialogue, &campaign, self.deps.llm.as_ref(), &turn.text)
            .await
            .map_err(WorkerError::from)?;

        let client = self.client.clone().ok_or(WorkerError::NoProxy)?;
        let recipient = Recipient::Id(dialogue.telegram_user_id);
        if let Some(&last_id) = turn.telegram_message_ids.last() {
            let _ = client.mark_as_read(&recipient, last_id).await;
        }

        let reading_delay = ((turn.text.chars().count() as f64 / 15.0) * rand::thread_rng().gen_range(0.8..1.2)
            + rand::thread_rng().gen_range(0.5..2.0))
        .clamp(1.0, 8.0);
        tokio::time::sleep(Duration::from_secs_f64(reading_delay)).await;

        if !outcome.reply_parts.is_empty() {
            let typing_times: Vec<Duration> = outcome.reply_parts.iter().map(|p| typing_time_for(p)).collect();
            let pause = Duration::from_millis(rand::thread_rng().gen_range(800..2000));
            let send = client
                .send_messages_natural(&recipient, &outcome.reply_parts, &typing_times, pause)
                .await;
            if let Ok(ids) = send {
                if let Some(last) = dialogue.messages.last_mut() {
                    last.telegram_message_id = ids.last().copied();
                }
            }
        }

        match outcome.action {
            crate::dialogue::parser::DialogueAction::Continue => {}
            crate::dialogue::parser::DialogueAction::SendLinks => {
                let link_msg = pipeline::compose_link_response(&mut dialogue, &campaign);
                if let Ok(id) = client.send_message(&recipient, &link_msg, None).await {
                    let _ = dialogue.add_message(MessageRole::Account, link_msg, Some(id), false, 0, false);
                }
            }
            crate::dialogue::parser::DialogueAction::NegativeFinish => dialogue.mark_completed(),
            crate::dialogue::parser::DialogueAction::Handoff => {
                dialogue.needs_review = true;
                dialogue.status = DialogueStatus::Paused;
            }
            crate::dialogue::parser::DialogueAction::CreativeSent => dialogue.creative_sent = true,
        }

        {
            let conn = self.deps.db.lock().await;
            if let Some(mut account) = repo::account::get(&conn, self.account_id)? {
                account.record_response_sent();
                repo::account::save(&conn, &mut account)?;
            }

            let mut campaign_dirty = false;
            if let Some(reason) = outcome.terminated {
                campaign.stats.failed += 1;
                campaign_dirty = true;
                if let Some(mut target) = repo::target::get(&conn, dialogue.target_user_id)? {
                    match reason {
                        TerminationReason::MediaSpam => target.mark_failed("media_spam"),
                        TerminationReason::UserRejected => {
                            target.mark_failed("user_rejected");
                            campaign.stats.total_messages_sent += 1;
                        }
                    }
                    repo::target::save(&conn, &mut target)?;
                }
            }
            if outcome.became_active {
                campaign.stats.responded += 1;
                campaign_dirty = true;
                if let Some(mut target) = repo::target::get(&conn, dialogue.target_user_id)? {
                    target.mark_in_progress();
                    repo::target::save(&conn, &mut target)?;
                }
            }
            if outcome.goal_reached {
                campaign.stats.goals_reached += 1;
                campaign_dirty = true;
                if let Some(mut target) = repo::target::get(&conn, dialogue.target_user_id)? {
                    target.mark_converted();
                    repo::target::save(&conn, &mut target)?;
                }
            }
            if campaign_dirty {
                repo::campaign::save(&conn, &mut campaign)?;
            }
        }

        if outcome.goal_reached {
            if let Some(identifier) = dialogue.telegram_username.clone() {
                let _ = crate::results::record_target_result(
                    dialogue.campaign_id,
                    identifier,
                    crate::results::ResultType::Success,
                    None,
                    campaign.sending.targets_file_path.clone(),
                )
                .await;
            }
        }

        let conn = self.deps.db.lock().await;
        repo::dialogue::save(&conn, &mut dialogue, false)?;
        Ok(())
    }

    async fn dialogue_lock(&self, dialogue_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.dialogue_locks.lock().await;
        if locks.len() > DIALOGUE_MAP_EVICT_AT {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(dialogue_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn spawn_background_loop(&mut self, client: Arc<dyn TelegramClient>) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        self.bg_stop = Some(tx);
        let account_id = self.account_id;
        let pools = self.deps.config.pools.clone();
        tokio::spawn(async move {
            background::run_background_loop(account_id, client, &pools, rx).await;
        });
    }

    /// One §4.8.1 warm-up cycle, run once per main-loop tick when the
    /// account is still in warm-up. Returns `true` while warm-up is active,
    /// so the caller knows to skip outreach this tick.
    async fn maybe_run_warmup_cycle(&mut self) -> bool {
        let Some(client) = self.client.clone() else { return false };
        let Some(warmup) = self.warmup.as_mut() else { return false };
        if warmup.status != crate::model::WarmupStatus::Active {
            return false;
        }
        warmup::run_cycle(warmup, &client, &self.deps.config.pools).await;
        true
    }

    async fn stop(&mut self) {
        self.batcher.cancel_all().await;
        if let Some(tx) = self.bg_stop.take() {
            let _ = tx.send(true);
        }
        if let Some(conn) = self.deps.db.try_lock().ok() {
            if let Ok(Some(mut account)) = repo::account::get(&conn, self.account_id) {
                account.pause();
                let _ = repo::account::save(&conn, &mut account);
            }
        }
    }
}

fn proxy_scheme(t: crate::model::ProxyType) -> &'static str {
    match t {
        crate::model::ProxyType::Socks5 => "socks5",
        crate::model::ProxyType::Socks4 => "socks4",
        crate::model::ProxyType::Http => "http",
        crate::model::ProxyType::Https => "https",
        crate::model::ProxyType::Mtproto => "mtproto",
    }
}

fn recipient_for(target: &UserTarget) -> Recipient {
    match target.telegram_id {
        Some(id) => Recipient::Id(id),
        None => Recipient::Username(target.username.clone().unwrap_or_default()),
    }
}

/// Batch key is always the stable numeric sender id — usernames can change
/// mid-conversation, `telegram_user_id` on the dialogue cannot.
fn incoming_key(msg: &IncomingMessage) -> String {
    msg.sender_id.to_string()
}

/// Typing time for one reply part: `(len/250)*60s`, clamped to `[1, 12]s`,
/// jittered `U(0.8, 1.3)` (§4.8 inbound handling, step 3).
fn typing_time_for(part: &str) -> Duration {
    let base = (part.chars().count() as f64 / 250.0) * 60.0;
    let jittered = (base * rand::thread_rng().gen_range(0.8..1.3)).clamp(1.0, 12.0);
    Duration::from_secs_f64(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_time_is_clamped() {
        let short = typing_time_for("hi");
        assert!(short.as_secs_f64() >= 1.0);
        let long = typing_time_for(&"x".repeat(5000));
        assert!(long.as_secs_f64() <= 12.0);
    }

    #[test]
    fn recipient_prefers_telegram_id() {
        let mut target = UserTarget::new(Uuid::new_v4(), Some(42), Some("alice".into()), None).unwrap();
        target.username = Some("alice".into());
        match recipient_for(&target) {
            Recipient::Id(id) => assert_eq!(id, 42),
            _ => panic!("expected Id recipient"),
        }
    }
}
