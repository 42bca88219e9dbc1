use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EntityMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Ready,
    Active,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CampaignGoal {
    pub target_message: Option<String>,
    pub target_action: Option<String>,
    pub target_url: Option<String>,
    pub min_messages_before_goal: u32,
    pub max_messages_before_goal: u32,
}

impl CampaignGoal {
    pub fn is_configured(&self) -> bool {
        self.target_message
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CampaignPrompt {
    pub system_prompt: String,
    pub first_message_template: String,
    pub goal_transition_hints: Vec<String>,
    pub forbidden_topics: Vec<String>,
    pub language: String,
    pub tone: String,
}

impl Default for CampaignPrompt {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            first_message_template: String::new(),
            goal_transition_hints: Vec::new(),
            forbidden_topics: Vec::new(),
            language: "ru".into(),
            tone: "friendly".into(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CampaignSending {
    pub send_interval_hours: f64,
    pub messages_per_batch: u32,
    pub message_delay_min: u32,
    pub message_delay_max: u32,
    pub last_batch_at: Option<DateTime<Utc>>,
    pub targets_file_path: Option<String>,
    pub follow_up_enabled: bool,
}

impl Default for CampaignSending {
    fn default() -> Self {
        Self {
            send_interval_hours: 13.0,
            messages_per_batch: 10,
            message_delay_min: 17,
            message_delay_max: 23,
            last_batch_at: None,
            targets_file_path: None,
            follow_up_enabled: true,
        }
    }
}

impl CampaignSending {
    pub fn can_send_batch(&self, now: DateTime<Utc>) -> bool {
        match self.last_batch_at {
            None => true,
            Some(last) => {
                now >= last + chrono::Duration::minutes((self.send_interval_hours * 60.0) as i64)
            }
        }
    }

    pub fn record_batch_sent(&mut self) {
        self.last_batch_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CampaignStats {
    pub total_targets: u64,
    pub contacted: u64,
    pub responded: u64,
    pub goals_reached: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_messages_sent: u64,
    pub total_tokens_used: u64,
}

impl CampaignStats {
    pub fn response_rate(&self) -> f64 {
        if self.contacted == 0 {
            0.0
        } else {
            self.responded as f64 / self.contacted as f64 * 100.0
        }
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.contacted == 0 {
            0.0
        } else {
            self.goals_reached as f64 / self.contacted as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CampaignAiSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CampaignAiSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Campaign {
    pub meta: EntityMeta,
    pub name: String,
    pub description: String,
    pub status: CampaignStatus,
    pub goal: CampaignGoal,
    pub prompt: CampaignPrompt,
    pub stats: CampaignStats,
    pub sending: CampaignSending,
    pub ai: CampaignAiSettings,
    pub account_ids: Vec<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn new(name: String) -> Self {
        Self {
            meta: EntityMeta::new(),
            name,
            description: String::new(),
            status: CampaignStatus::Draft,
            goal: CampaignGoal {
                min_messages_before_goal: 3,
                max_messages_before_goal: 10,
                ..Default::default()
            },
            prompt: CampaignPrompt::default(),
            stats: CampaignStats::default(),
            sending: CampaignSending::default(),
            ai: CampaignAiSettings::default(),
            account_ids: Vec::new(),
            start_date: None,
            end_date: None,
        }
    }

    /// Activation precondition from §4.9: non-empty system prompt, ≥1 account.
    /// The "≥1 target" half of the precondition is checked by the caller
    /// against the target repository, since it isn't data this aggregate owns.
    pub fn activate(&mut self) -> Result<(), String> {
        if !matches!(
            self.status,
            CampaignStatus::Draft | CampaignStatus::Ready | CampaignStatus::Paused
        ) {
            return Err(format!("cannot activate campaign in {:?} status", self.status));
        }
        if self.prompt.system_prompt.trim().is_empty() {
            return Err("campaign requires system prompt".into());
        }
        if self.account_ids.is_empty() {
            return Err("campaign requires at least one account".into());
        }
        self.status = CampaignStatus::Active;
        if self.start_date.is_none() {
            self.start_date = Some(Utc::now());
        }
        self.meta.touch();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), String> {
        if self.status != CampaignStatus::Active {
            return Err("can only pause active campaigns".into());
        }
        self.status = CampaignStatus::Paused;
        self.meta.touch();
        Ok(())
    }

    pub fn complete(&mut self) {
        self.status = CampaignStatus::Completed;
        self.end_date = Some(Utc::now());
        self.meta.touch();
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }

    /// Assembles the persona + goal + hints + forbidden-topics block used as
    /// the system prompt for every LLM call in this campaign (§4.6.4).
    pub fn system_prompt(&self) -> String {
        let mut parts = vec![self.prompt.system_prompt.clone()];
        if let Some(msg) = &self.goal.target_message {
            parts.push(format!(
                "\n\nЦель разговора: постепенно подвести собеседника к следующей информации: {msg}"
            ));
        }
        if let Some(url) = &self.goal.target_url {
            parts.push(format!("\nЦелевая ссылка для продвижения: {url}"));
        }
        if !self.prompt.goal_transition_hints.is_empty() {
            let hints = self
                .prompt
                .goal_transition_hints
                .iter()
                .map(|h| format!("- {h}"))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("\n\nПодсказки для перехода к цели:\n{hints}"));
        }
        if !self.prompt.forbidden_topics.is_empty() {
            parts.push(format!(
                "\n\nИзбегай следующих тем: {}",
                self.prompt.forbidden_topics.join(", ")
            ));
        }
        parts.push(format!("\n\nТон общения: {}", self.prompt.tone));
        parts.push(format!("Язык: {}", self.prompt.language));
        parts.join("\n")
    }
}
