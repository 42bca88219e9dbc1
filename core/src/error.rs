//! Typed error enums per component, mirroring the error-kind table: each
//! variant is something a caller branches on (retry, fail-over, terminal
//! transition), not just a message to log.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("session blob too short to contain a SQLite header")]
    Truncated,
    #[error("auth_key must be exactly 256 bytes, got {0}")]
    BadAuthKeyLen(usize),
    #[error("encryption failure: {0}")]
    Crypto(String),
    #[error("malformed session data: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no available proxy{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    NotAvailable(Option<String>),
    #[error("proxy {0} not found")]
    NotFound(String),
    #[error("proxy {0} connection failed: {1}")]
    Connection(String, String),
}

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("flood wait: {0}s")]
    Flood(u64),
    #[error("peer flood")]
    PeerFlood,
    #[error("privacy restricted")]
    Privacy,
    #[error("authorization error: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operation timed out")]
    Timeout,
    #[error("user not found: {0}")]
    UserNotFound(String),
}

impl TelegramError {
    /// `PeerFlood` is always handled as a one-hour flood wait.
    pub fn flood_seconds(&self) -> Option<u64> {
        match self {
            TelegramError::Flood(s) => Some(*s),
            TelegramError::PeerFlood => Some(3600),
            _ => None,
        }
    }

    pub fn is_connection_class(&self) -> bool {
        matches!(self, TelegramError::Network(_) | TelegramError::Timeout)
    }

    pub fn is_auth_class(&self) -> bool {
        matches!(self, TelegramError::Auth(_))
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("task not found in processing set: {0}")]
    NotInProcessing(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited, retry after {0}s")]
    RateLimit(u64),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("account has no assigned proxy")]
    NoProxy,
    #[error(transparent)]
    Telegram(#[from] TelegramError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("account entered error state: {0}")]
    AccountError(String),
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("optimistic lock conflict on {entity} {id}")]
    OptimisticLock { entity: &'static str, id: String },
    #[error("not found: {0}")]
    NotFound(String),
}
