//! Telegram-client adapter (C3). The trait is the narrow capability named in
//! §9 ("express each as a narrow capability... `TelegramClient`"); the
//! concrete adapter wraps one `grammers-client` MTProto connection per
//! account. Grounded on `im/transport.rs` (one trait per channel, only the
//! trait is visible to worker code) and on
//! `examples/other_examples/*Lonami-grammers*` for the real client shape —
//! `grammers-client` is the idiomatic choice here because this spec needs
//! authenticated user sessions, not a bot token.

pub mod client;
pub mod fingerprint;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::TelegramError;
pub use fingerprint::DeviceFingerprint;

/// An incoming private message from a non-bot user, already normalized:
/// non-text media has been converted to a placeholder (`"[стикер]"`,
/// `"[фото]"`, `"[видео]"`, `"[голосовое сообщение]"`) per §4.3.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub sender_id: i64,
    pub sender_username: Option<String>,
    pub text: String,
    pub telegram_message_id: i64,
}

pub const STICKER_PLACEHOLDER: &str = "[стикер]";
pub const PHOTO_PLACEHOLDER: &str = "[фото]";
pub const VIDEO_PLACEHOLDER: &str = "[видео]";
pub const VOICE_PLACEHOLDER: &str = "[голосовое сообщение]";

pub const MEDIA_PLACEHOLDERS: &[&str] = &[
    STICKER_PLACEHOLDER,
    PHOTO_PLACEHOLDER,
    VIDEO_PLACEHOLDER,
    VOICE_PLACEHOLDER,
];

#[derive(Debug, Clone)]
pub struct ScrapedParticipant {
    pub id: i64,
    pub username: Option<String>,
    pub is_bot: bool,
}

/// Either a numeric Telegram id or a `@username` — the recipient form every
/// send operation accepts.
#[derive(Debug, Clone)]
pub enum Recipient {
    Id(i64),
    Username(String),
}

/// Connection-level handle for one account. Construction parameters are the
/// decrypted/normalized session, the mandatory proxy, API credentials, and a
/// device fingerprint — see §4.3. All operations serialize on the owning
/// worker; the trait itself is `&self` to allow an `Arc` to be shared with
/// the incoming-message dispatch task, but implementations must not issue
/// two concurrent MTProto calls.
#[async_trait]
pub trait TelegramClient: Send + Sync {
    async fn send_message(
        &self,
        recipient: &Recipient,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, TelegramError>;

    /// Sends each part of a natural multi-message reply: shows typing for
    /// `typing_times[i]`, sends `parts[i]`, sleeps
    /// `pause_between * U(0.7, 1.3)` between parts.
    async fn send_messages_natural(
        &self,
        recipient: &Recipient,
        parts: &[String],
        typing_times: &[std::time::Duration],
        pause_between: std::time::Duration,
    ) -> Result<Vec<i64>, TelegramError>;

    async fn mark_as_read(&self, user: &Recipient, max_id: i64) -> Result<(), TelegramError>;

    /// Refreshes the typing indicator every 4.5s for `duration` (server
    /// typing state expires after ~5s).
    async fn type_and_wait(&self, user: &Recipient, duration: std::time::Duration);

    async fn join_channel(&self, link: &str) -> Result<(), TelegramError>;
    async fn leave_channel(&self, link: &str) -> Result<(), TelegramError>;

    async fn scrape_group_participants(
        &self,
        entity: &str,
        max: usize,
        skip_bots: bool,
        skip_no_username: bool,
    ) -> Result<Vec<ScrapedParticipant>, TelegramError>;

    /// Registers the handler invoked for each incoming private message from
    /// a non-bot user.
    fn on_message(&self, handler: Box<dyn Fn(IncomingMessage) + Send + Sync>);
}

/// Everything a client implementation needs to open a connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub account_id: Uuid,
    pub api_id: i32,
    pub api_hash: String,
    pub device: DeviceFingerprint,
}
