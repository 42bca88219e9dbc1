//! Domain entities. Plain structs with invariant-preserving transition
//! methods; no persistence awareness lives here, that's `crate::repo`.

mod account;
mod campaign;
mod dialogue;
mod proxy;
mod target;
mod task;
mod telegram_app;
mod warmup;

pub use account::{Account, AccountLimits, AccountSchedule, AccountSource, AccountStatus};
pub use campaign::{
    Campaign, CampaignAiSettings, CampaignGoal, CampaignPrompt, CampaignSending, CampaignStats,
    CampaignStatus,
};
pub use dialogue::{Dialogue, DialogueStatus, Message, MessageRole};
pub use proxy::{Proxy, ProxyStatus, ProxyType};
pub use target::{TargetStatus, UserTarget};
pub use task::{Task, TaskType};
pub use telegram_app::TelegramApp;
pub use warmup::{
    AccountPersona, AccountWarmup, WarmupChannel, WarmupGroup, WarmupProfile, WarmupStage,
    WarmupStatus,
};

use uuid::Uuid;

/// Base fields every aggregate carries: identity, timestamps, optimistic-lock version.
///
/// Per §9's "optimistic locking vs domain-layer version bumps": domain methods
/// call `touch()`, never bump `version` themselves — only the repository does
/// that, on successful save.
#[derive(Debug, Clone, Copy)]
pub struct EntityMeta {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub version: i64,
}

impl EntityMeta {
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}
