use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EntityMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueStatus {
    Pending,
    Initiated,
    Active,
    GoalReached,
    Completed,
    Failed,
    Paused,
    Expired,
}

impl DialogueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DialogueStatus::Completed | DialogueStatus::Failed | DialogueStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Account,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub telegram_message_id: Option<i64>,
    pub ai_generated: bool,
    pub tokens_used: u32,
    pub is_follow_up: bool,
}

impl Message {
    pub fn to_llm_role(&self) -> &'static str {
        match self.role {
            MessageRole::Account => "assistant",
            MessageRole::User => "user",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dialogue {
    pub meta: EntityMeta,
    pub account_id: Uuid,
    pub campaign_id: Uuid,
    pub target_user_id: Uuid,
    pub telegram_user_id: i64,
    pub telegram_username: Option<String>,
    pub status: DialogueStatus,
    pub messages: Vec<Message>,
    pub goal_message_sent: bool,
    pub goal_message_sent_at: Option<DateTime<Utc>>,
    pub next_action_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_user_response_at: Option<DateTime<Utc>>,
    pub interest_score: i32,
    pub link_sent_count: u32,
    pub fail_reason: Option<String>,
    pub needs_review: bool,
    pub creative_sent: bool,
}

impl Dialogue {
    pub fn new(account_id: Uuid, campaign_id: Uuid, target_user_id: Uuid, telegram_user_id: i64) -> Self {
        Self {
            meta: EntityMeta::new(),
            account_id,
            campaign_id,
            target_user_id,
            telegram_user_id,
            telegram_username: None,
            status: DialogueStatus::Pending,
            messages: Vec::new(),
            goal_message_sent: false,
            goal_message_sent_at: None,
            next_action_at: None,
            retry_count: 0,
            max_retries: 3,
            last_user_response_at: None,
            interest_score: 0,
            link_sent_count: 0,
            fail_reason: None,
            needs_review: false,
            creative_sent: false,
        }
    }

    /// Appends only. Terminal dialogues refuse further history per invariant
    /// 2 in §8 — callers must check `status.is_terminal()` before invoking
    /// any pipeline step that would append; this is the hard backstop.
    pub fn add_message(
        &mut self,
        role: MessageRole,
        content: String,
        telegram_message_id: Option<i64>,
        ai_generated: bool,
        tokens_used: u32,
        is_follow_up: bool,
    ) -> Result<&Message, String> {
        if self.status.is_terminal() {
            return Err(format!("dialogue {} is terminal, refusing append", self.meta.id));
        }
        let message = Message {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            telegram_message_id,
            ai_generated,
            tokens_used,
            is_follow_up,
        };
        self.messages.push(message);
        if role == MessageRole::User {
            self.last_user_response_at = Some(Utc::now());
            if self.status == DialogueStatus::Initiated {
                self.status = DialogueStatus::Active;
            }
        }
        self.meta.touch();
        Ok(self.messages.last().unwrap())
    }

    pub fn conversation_history(&self, max_messages: usize) -> Vec<(&'static str, &str)> {
        let start = self.messages.len().saturating_sub(max_messages);
        self.messages[start..]
            .iter()
            .map(|m| (m.to_llm_role(), m.content.as_str()))
            .collect()
    }

    pub fn mark_initiated(&mut self) {
        self.status = DialogueStatus::Initiated;
    }

    pub fn mark_goal_reached(&mut self) {
        self.goal_message_sent = true;
        self.goal_message_sent_at = Some(Utc::now());
        self.status = DialogueStatus::GoalReached;
    }

    pub fn mark_completed(&mut self) {
        self.status = DialogueStatus::Completed;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = DialogueStatus::Failed;
        self.fail_reason = Some(reason.into());
    }

    pub fn mark_expired(&mut self) {
        self.status = DialogueStatus::Expired;
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.status, DialogueStatus::Initiated | DialogueStatus::Active)
            && self.retry_count < self.max_retries
    }

    pub fn account_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::Account)
            .count()
    }

    pub fn user_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_account_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::Account)
    }

    pub fn follow_up_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_follow_up).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_dialogue_refuses_append() {
        let mut d = Dialogue::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 1);
        d.mark_failed("user_rejected");
        let result = d.add_message(MessageRole::User, "hi".into(), None, false, 0, false);
        assert!(result.is_err());
    }

    #[test]
    fn user_reply_advances_initiated_to_active() {
        let mut d = Dialogue::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 1);
        d.mark_initiated();
        d.add_message(MessageRole::User, "hi".into(), None, false, 0, false).unwrap();
        assert_eq!(d.status, DialogueStatus::Active);
    }
}
