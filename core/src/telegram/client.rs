//! `grammers-client`-backed implementation of [`TelegramClient`]. One
//! instance per account, owning exactly one MTProto connection routed
//! through the account's assigned proxy — never a direct connection
//! (invariant 1 in spec §8).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use grammers_client::types::Chat;
use grammers_client::{Client, Config, InitParams, SignInError, Update};
use grammers_session::Session;
use rand::Rng;
use tokio::time::sleep;

use crate::error::TelegramError;
use crate::vault::StringSession;

use super::{
    ClientConfig, IncomingMessage, Recipient, ScrapedParticipant, TelegramClient,
    PHOTO_PLACEHOLDER, STICKER_PLACEHOLDER, VIDEO_PLACEHOLDER, VOICE_PLACEHOLDER,
};

/// Typing indicator must be refreshed roughly this often; server-side typing
/// state expires after ~5s.
const TYPING_REFRESH: Duration = Duration::from_millis(4500);

type MessageHandler = Box<dyn Fn(IncomingMessage) + Send + Sync>;

pub struct GrammersTelegramClient {
    client: Client,
    handler: Arc<Mutex<Option<MessageHandler>>>,
}

impl GrammersTelegramClient {
    /// Opens one MTProto connection through `proxy_url` (mandatory — callers
    /// must never omit it), using the already-normalized string session and
    /// the generated device fingerprint.
    pub async fn connect(
        cfg: ClientConfig,
        session: StringSession,
        proxy_url: &str,
    ) -> Result<Self, TelegramError> {
        let grammers_session = Session::load(&session.encode())
            .map_err(|e| TelegramError::Auth(e.to_string()))?;

        let init_params = InitParams {
            device_model: cfg.device.device_model.clone(),
            system_version: cfg.device.system_version.clone(),
            app_version: cfg.device.app_version.clone(),
            lang_code: cfg.device.lang_code.clone(),
            system_lang_code: cfg.device.system_lang_code.clone(),
            proxy_url: Some(proxy_url.to_string()),
            ..Default::default()
        };

        let client = Client::connect(Config {
            session: grammers_session,
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            params: init_params,
        })
        .await
        .map_err(|e| TelegramError::Network(e.to_string()))?;

        if !client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Network(e.to_string()))?
        {
            return Err(TelegramError::Auth("session not authorized".into()));
        }

        Ok(Self {
            client,
            handler: Arc::new(Mutex::new(None)),
        })
    }

    /// Background loop forwarding `Update::NewMessage` from non-bot private
    /// chats to the registered handler, with media converted to the §4.3
    /// placeholder set. Spawned once by the worker after `connect`.
    pub fn spawn_update_loop(&self) {
        let client = self.client.clone();
        let handler = self.handler.clone();
        tokio::spawn(async move {
            loop {
                match client.next_update().await {
                    Ok(Update::NewMessage(message)) if !message.outgoing() => {
                        let Chat::User(sender) = message.chat() else {
                            continue;
                        };
                        if sender.is_bot() {
                            continue;
                        }
                        let text = normalize_message_text(&message);
                        let incoming = IncomingMessage {
                            sender_id: sender.id(),
                            sender_username: sender.username().map(str::to_string),
                            text,
                            telegram_message_id: message.id() as i64,
                        };
                        if let Some(h) = handler.lock().unwrap().as_ref() {
                            h(incoming);
                        }
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        });
    }

    async fn resolve(&self, recipient: &Recipient) -> Result<Chat, TelegramError> {
        let pack = match recipient {
            Recipient::Id(id) => self.client.resolve_username(&id.to_string()).await,
            Recipient::Username(u) => self.client.resolve_username(u).await,
        };
        pack.map_err(|e| TelegramError::Network(e.to_string()))?
            .ok_or_else(|| TelegramError::UserNotFound(format!("{recipient:?}")))
    }
}

/// Non-text media is replaced with a textual placeholder per §4.3, never
/// forwarded as-is into the dialogue pipeline.
fn normalize_message_text(message: &grammers_client::types::Message) -> String {
    let text = message.text();
    if !text.is_empty() {
        return text.to_string();
    }
    match message.media() {
        Some(grammers_client::types::Media::Sticker(_)) => STICKER_PLACEHOLDER.to_string(),
        Some(grammers_client::types::Media::Photo(_)) => PHOTO_PLACEHOLDER.to_string(),
        Some(grammers_client::types::Media::Document(doc)) if doc.is_round_message() || doc.is_voice() => {
            VOICE_PLACEHOLDER.to_string()
        }
        Some(_) => VIDEO_PLACEHOLDER.to_string(),
        None => String::new(),
    }
}

fn classify_error(err: grammers_client::InvocationError) -> TelegramError {
    use grammers_client::InvocationError;
    match err {
        InvocationError::Rpc(rpc) if rpc.name == "FLOOD_WAIT" => {
            TelegramError::Flood(rpc.value.unwrap_or(0) as u64)
        }
        InvocationError::Rpc(rpc) if rpc.name == "PEER_FLOOD" => TelegramError::PeerFlood,
        InvocationError::Rpc(rpc)
            if rpc.name.contains("PRIVACY") || rpc.name == "CHAT_WRITE_FORBIDDEN" =>
        {
            TelegramError::Privacy
        }
        InvocationError::Rpc(rpc) if rpc.name.contains("AUTH") => {
            TelegramError::Auth(rpc.name.to_string())
        }
        other => TelegramError::Network(other.to_string()),
    }
}

#[async_trait]
impl TelegramClient for GrammersTelegramClient {
    async fn send_message(
        &self,
        recipient: &Recipient,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, TelegramError> {
        let chat = self.resolve(recipient).await?;
        let mut request = grammers_client::InputMessage::text(text);
        if let Some(id) = reply_to {
            request = request.reply_to(Some(id as i32));
        }
        let sent = self
            .client
            .send_message(&chat, request)
            .await
            .map_err(classify_error)?;
        Ok(sent.id() as i64)
    }

    async fn send_messages_natural(
        &self,
        recipient: &Recipient,
        parts: &[String],
        typing_times: &[Duration],
        pause_between: Duration,
    ) -> Result<Vec<i64>, TelegramError> {
        let mut ids = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let typing_time = typing_times.get(i).copied().unwrap_or(Duration::from_secs(1));
            self.type_and_wait(recipient, typing_time).await;
            let id = self.send_message(recipient, part, None).await?;
            ids.push(id);
            if i + 1 < parts.len() {
                let jitter: f64 = rand::thread_rng().gen_range(0.7..=1.3);
                sleep(pause_between.mul_f64(jitter)).await;
            }
        }
        Ok(ids)
    }

    async fn mark_as_read(&self, user: &Recipient, max_id: i64) -> Result<(), TelegramError> {
        let chat = self.resolve(user).await?;
        let _ = self.client.mark_as_read(&chat, max_id as i32).await;
        Ok(())
    }

    async fn type_and_wait(&self, user: &Recipient, duration: Duration) {
        let Ok(chat) = self.resolve(user).await else {
            return;
        };
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            let _ = self.client.set_typing(&chat).await;
            let step = remaining.min(TYPING_REFRESH);
            sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }

    async fn join_channel(&self, link: &str) -> Result<(), TelegramError> {
        self.client
            .join_chat(link)
            .await
            .map(|_| ())
            .map_err(classify_error)
    }

    async fn leave_channel(&self, link: &str) -> Result<(), TelegramError> {
        self.client
            .leave_chat(link)
            .await
            .map(|_| ())
            .map_err(classify_error)
    }

    async fn scrape_group_participants(
        &self,
        entity: &str,
        max: usize,
        skip_bots: bool,
        skip_no_username: bool,
    ) -> Result<Vec<ScrapedParticipant>, TelegramError> {
        let chat = self
            .client
            .resolve_username(entity)
            .await
            .map_err(classify_error)?
            .ok_or_else(|| TelegramError::UserNotFound(entity.to_string()))?;

        let mut out = Vec::new();
        let mut iter = self.client.iter_participants(&chat);
        while out.len() < max {
            match iter.next().await {
                Ok(Some(p)) => {
                    let user = p.user;
                    if skip_bots && user.is_bot() {
                        continue;
                    }
                    if skip_no_username && user.username().is_none() {
                        continue;
                    }
                    out.push(ScrapedParticipant {
                        id: user.id(),
                        username: user.username().map(str::to_string),
                        is_bot: user.is_bot(),
                    });
                    sleep(Duration::from_millis(500)).await;
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        Ok(out)
    }

    fn on_message(&self, handler: Box<dyn Fn(IncomingMessage) + Send + Sync>) {
        *self.handler.lock().unwrap() = Some(handler);
    }
}

/// Maps a sign-in error to the coarse Auth class the worker's start loop
/// treats specially (abort immediately, no proxy retry).
pub fn is_auth_class(err: &SignInError) -> bool {
    matches!(
        err,
        SignInError::InvalidCode | SignInError::InvalidPassword | SignInError::SignUpRequired { .. }
    )
}
