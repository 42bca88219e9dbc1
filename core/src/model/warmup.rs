use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EntityMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct WarmupStage {
    pub stage: u32,
    pub days: u32,
    pub daily_messages: u32,
    pub join_channels: u32,
    pub join_groups: u32,
    pub reactions_per_day: u32,
    pub can_outreach: bool,
}

#[derive(Debug, Clone)]
pub struct WarmupProfile {
    pub id: Uuid,
    pub name: String,
    pub total_days: u32,
    pub stages: Vec<WarmupStage>,
    pub typing_speed_cpm: u32,
    pub reaction_probability: f64,
    pub is_default: bool,
}

impl WarmupProfile {
    pub fn stage_config(&self, stage_num: u32) -> Option<&WarmupStage> {
        self.stages.iter().find(|s| s.stage == stage_num)
    }

    /// Stage covering the given elapsed day of warm-up, scanning stages in
    /// declared order and accumulating day counts.
    pub fn stage_for_day(&self, day: u32) -> Option<&WarmupStage> {
        let mut sorted: Vec<&WarmupStage> = self.stages.iter().collect();
        sorted.sort_by_key(|s| s.stage);
        let mut days_passed = 0u32;
        for stage in &sorted {
            days_passed += stage.days;
            if day <= days_passed {
                return Some(stage);
            }
        }
        sorted.last().copied()
    }
}

#[derive(Debug, Clone)]
pub struct AccountWarmup {
    pub meta: EntityMeta,
    pub account_id: Uuid,
    pub profile_id: Option<Uuid>,
    pub stage: u32,
    pub status: WarmupStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stage_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub channels_joined: u32,
    pub groups_joined: u32,
    pub reactions_sent: u32,
    pub messages_sent: u32,
    pub daily_reactions: u32,
    pub daily_messages: u32,
    pub daily_joins: u32,
    pub last_daily_reset: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub flood_wait_until: Option<DateTime<Utc>>,
}

impl AccountWarmup {
    pub fn new(account_id: Uuid, profile_id: Option<Uuid>) -> Self {
        Self {
            meta: EntityMeta::new(),
            account_id,
            profile_id,
            stage: 1,
            status: WarmupStatus::Pending,
            started_at: None,
            stage_started_at: None,
            completed_at: None,
            last_activity_at: None,
            channels_joined: 0,
            groups_joined: 0,
            reactions_sent: 0,
            messages_sent: 0,
            daily_reactions: 0,
            daily_messages: 0,
            daily_joins: 0,
            last_daily_reset: None,
            error_message: None,
            flood_wait_until: None,
        }
    }

    pub fn start(&mut self) {
        self.status = WarmupStatus::Active;
        self.started_at = Some(Utc::now());
        self.stage_started_at = Some(Utc::now());
    }

    pub fn advance_stage(&mut self, new_stage: u32) {
        self.stage = new_stage;
        self.stage_started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = WarmupStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = WarmupStatus::Failed;
        self.error_message = Some(message.into());
    }

    pub fn reset_daily_counters(&mut self) {
        self.daily_reactions = 0;
        self.daily_messages = 0;
        self.daily_joins = 0;
        self.last_daily_reset = Some(Utc::now());
    }

    pub fn record_activity(&mut self) {
        self.last_activity_at = Some(Utc::now());
        self.meta.touch();
    }

    pub fn can_do_activity(&self, now: DateTime<Utc>) -> bool {
        if self.status != WarmupStatus::Active {
            return false;
        }
        !matches!(self.flood_wait_until, Some(until) if until > now)
    }
}

/// Simulated personality attached to an account: typing cadence, active
/// hours, reaction probability — used by both warm-up and background
/// activity to keep behaviour human-shaped and per-account distinct.
#[derive(Debug, Clone)]
pub struct AccountPersona {
    pub id: Uuid,
    pub account_id: Uuid,
    pub interests: Vec<String>,
    pub timezone: String,
    pub language: String,
    pub typing_speed_cpm: u32,
    pub reaction_probability: f64,
    pub min_response_delay_secs: u32,
    pub max_response_delay_secs: u32,
    pub active_hours_start: u32,
    pub active_hours_end: u32,
}

impl AccountPersona {
    pub fn is_active_time(&self, hour: u32) -> bool {
        if self.active_hours_start <= self.active_hours_end {
            hour >= self.active_hours_start && hour < self.active_hours_end
        } else {
            hour >= self.active_hours_start || hour < self.active_hours_end
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarmupChannel {
    pub id: Uuid,
    pub username: String,
    pub language: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct WarmupGroup {
    pub id: Uuid,
    pub username: String,
    pub can_write: bool,
    pub is_active: bool,
}
