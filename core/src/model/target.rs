use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EntityMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Pending,
    Assigned,
    Contacted,
    InProgress,
    Converted,
    Completed,
    Failed,
    Skipped,
    Blocked,
}

#[derive(Debug, Clone)]
pub struct UserTarget {
    pub meta: EntityMeta,
    pub campaign_id: Uuid,
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub status: TargetStatus,
    pub assigned_account_id: Option<Uuid>,
    pub dialogue_id: Option<Uuid>,
    pub priority: i32,
    pub source: String,
    pub contact_attempts: u32,
    pub last_contact_attempt: Option<DateTime<Utc>>,
    pub fail_reason: Option<String>,
}

impl UserTarget {
    /// At least one of {telegram_id, username, phone} is required; this
    /// mirrors the Python `__post_init__` validation exactly.
    pub fn new(
        campaign_id: Uuid,
        telegram_id: Option<i64>,
        username: Option<String>,
        phone: Option<String>,
    ) -> Result<Self, String> {
        if telegram_id.is_none() && username.is_none() && phone.is_none() {
            return Err("UserTarget requires at least one identifier".into());
        }
        Ok(Self {
            meta: EntityMeta::new(),
            campaign_id,
            telegram_id,
            username,
            phone,
            first_name: String::new(),
            last_name: String::new(),
            status: TargetStatus::Pending,
            assigned_account_id: None,
            dialogue_id: None,
            priority: 0,
            source: String::new(),
            contact_attempts: 0,
            last_contact_attempt: None,
            fail_reason: None,
        })
    }

    /// Primary identifier for Telegram lookup, in username > id > phone order.
    pub fn identifier(&self) -> Option<String> {
        self.username
            .clone()
            .or_else(|| self.telegram_id.map(|id| id.to_string()))
            .or_else(|| self.phone.clone())
    }

    pub fn assign_to_account(&mut self, account_id: Uuid) {
        self.assigned_account_id = Some(account_id);
        self.status = TargetStatus::Assigned;
        self.meta.touch();
    }

    pub fn mark_contacted(&mut self, dialogue_id: Option<Uuid>) {
        if let Some(id) = dialogue_id {
            self.dialogue_id = Some(id);
        }
        self.status = TargetStatus::Contacted;
        self.contact_attempts += 1;
        self.last_contact_attempt = Some(Utc::now());
        self.meta.touch();
    }

    pub fn mark_in_progress(&mut self) {
        self.status = TargetStatus::InProgress;
        self.meta.touch();
    }

    pub fn mark_converted(&mut self) {
        self.status = TargetStatus::Converted;
        self.meta.touch();
    }

    pub fn mark_completed(&mut self) {
        self.status = TargetStatus::Completed;
        self.meta.touch();
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = TargetStatus::Failed;
        self.fail_reason = Some(reason.into());
        self.meta.touch();
    }

    pub fn mark_blocked(&mut self) {
        self.status = TargetStatus::Blocked;
        self.meta.touch();
    }

    /// Only a non-terminal target can be (re)contacted — enforces invariant 4
    /// from §8: a target never returns to pending/assigned from a terminal state.
    pub fn can_contact(&self) -> bool {
        matches!(self.status, TargetStatus::Pending | TargetStatus::Assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_target_with_no_identifier() {
        assert!(UserTarget::new(Uuid::new_v4(), None, None, None).is_err());
    }

    #[test]
    fn terminal_target_cannot_be_recontacted() {
        let mut t = UserTarget::new(Uuid::new_v4(), Some(1), None, None).unwrap();
        t.mark_failed("privacy_settings");
        assert!(!t.can_contact());
    }
}
