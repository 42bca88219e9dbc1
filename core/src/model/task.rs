use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    SendFirstMessage,
    SendResponse,
    SendFollowUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub account_id: Uuid,
    pub campaign_id: Uuid,
    pub target_id: Option<Uuid>,
    pub dialogue_id: Option<Uuid>,
    pub recipient: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(task_type: TaskType, account_id: Uuid, campaign_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            account_id,
            campaign_id,
            target_id: None,
            dialogue_id: None,
            recipient: None,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: 3,
            last_error: None,
        }
    }
}
