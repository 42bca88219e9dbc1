//! Dialogue persistence: the aggregate row plus its append-only
//! `dialogue_messages` child table. `save` takes an explicit
//! `check_version` flag (§9/§5): the worker calls it with `false` from
//! inside the per-dialogue mutex that already serializes writes to one
//! dialogue, so the version check would only add overhead, never safety.
//! Anything saving a dialogue from outside that mutex (an admin fix-up,
//! a migration) should pass `true`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{Dialogue, DialogueStatus, Message, MessageRole};

use super::{next_version, parse_dt_opt, parse_uuid};

fn status_str(s: DialogueStatus) -> &'static str {
    match s {
        DialogueStatus::Pending => "pending",
        DialogueStatus::Initiated => "initiated",
        DialogueStatus::Active => "active",
        DialogueStatus::GoalReached => "goal_reached",
        DialogueStatus::Completed => "completed",
        DialogueStatus::Failed => "failed",
        DialogueStatus::Paused => "paused",
        DialogueStatus::Expired => "expired",
    }
}

fn parse_status(s: &str) -> DialogueStatus {
    match s {
        "initiated" => DialogueStatus::Initiated,
        "active" => DialogueStatus::Active,
        "goal_reached" => DialogueStatus::GoalReached,
        "completed" => DialogueStatus::Completed,
        "failed" => DialogueStatus::Failed,
        "paused" => DialogueStatus::Paused,
        "expired" => DialogueStatus::Expired,
        _ => DialogueStatus::Pending,
    }
}

fn role_str(r: MessageRole) -> &'static str {
    match r {
        MessageRole::Account => "account",
        MessageRole::User => "user",
    }
}

fn parse_role(s: &str) -> MessageRole {
    match s {
        "user" => MessageRole::User,
        _ => MessageRole::Account,
    }
}

const COLUMNS: &str = "id, created_at, updated_at, version, account_id, campaign_id, \
    target_user_id, telegram_user_id, telegram_username, status, goal_message_sent, \
    goal_message_sent_at, next_action_at, retry_count, max_retries, last_user_response_at, \
    interest_score, link_sent_count, fail_reason, needs_review, creative_sent";

fn from_row(row: &Row) -> rusqlite::Result<Dialogue> {
    let meta = super::read_meta(row, 0, 1, 2, 3)?;
    Ok(Dialogue {
        meta,
        account_id: parse_uuid(&row.get::<_, String>(4)?)?,
        campaign_id: parse_uuid(&row.get::<_, String>(5)?)?,
        target_user_id: parse_uuid(&row.get::<_, String>(6)?)?,
        telegram_user_id: row.get(7)?,
        telegram_username: row.get(8)?,
        status: parse_status(&row.get::<_, String>(9)?),
        messages: Vec::new(),
        goal_message_sent: row.get::<_, i64>(10)? != 0,
        goal_message_sent_at: parse_dt_opt(row.get(11)?)?,
        next_action_at: parse_dt_opt(row.get(12)?)?,
        retry_count: row.get(13)?,
        max_retries: row.get(14)?,
        last_user_response_at: parse_dt_opt(row.get(15)?)?,
        interest_score: row.get(16)?,
        link_sent_count: row.get(17)?,
        fail_reason: row.get(18)?,
        needs_review: row.get::<_, i64>(19)? != 0,
        creative_sent: row.get::<_, i64>(20)? != 0,
    })
}

fn load_messages(conn: &Connection, dialogue_id: Uuid) -> Result<Vec<Message>, RepoError> {
    let mut stmt = conn.prepare(
        "SELECT id, role, content, timestamp, telegram_message_id, ai_generated, tokens_used, \
         is_follow_up FROM dialogue_messages WHERE dialogue_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![dialogue_id.to_string()], |row| {
        Ok(Message {
            id: parse_uuid(&row.get::<_, String>(0)?)?,
            role: parse_role(&row.get::<_, String>(1)?),
            content: row.get(2)?,
            timestamp: super::parse_dt(&row.get::<_, String>(3)?)?,
            telegram_message_id: row.get(4)?,
            ai_generated: row.get::<_, i64>(5)? != 0,
            tokens_used: row.get(6)?,
            is_follow_up: row.get::<_, i64>(7)? != 0,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn replace_messages(conn: &Connection, dialogue_id: Uuid, messages: &[Message]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM dialogue_messages WHERE dialogue_id = ?1", params![dialogue_id.to_string()])?;
    for (seq, message) in messages.iter().enumerate() {
        conn.execute(
            "INSERT INTO dialogue_messages (id, dialogue_id, seq, role, content, timestamp, \
             telegram_message_id, ai_generated, tokens_used, is_follow_up) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                message.id.to_string(),
                dialogue_id.to_string(),
                seq as i64,
                role_str(message.role),
                message.content,
                message.timestamp.to_rfc3339(),
                message.telegram_message_id,
                message.ai_generated as i64,
                message.tokens_used,
                message.is_follow_up as i64,
            ],
        )?;
    }
    Ok(())
}

pub fn create(conn: &Connection, dialogue: &Dialogue) -> Result<(), RepoError> {
    conn.execute(
        &format!("INSERT INTO dialogues ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)"),
        params![
            dialogue.meta.id.to_string(),
            dialogue.meta.created_at.to_rfc3339(),
            dialogue.meta.updated_at.to_rfc3339(),
            dialogue.meta.version,
            dialogue.account_id.to_string(),
            dialogue.campaign_id.to_string(),
            dialogue.target_user_id.to_string(),
            dialogue.telegram_user_id,
            dialogue.telegram_username,
            status_str(dialogue.status),
            dialogue.goal_message_sent as i64,
            dialogue.goal_message_sent_at.map(|d| d.to_rfc3339()),
            dialogue.next_action_at.map(|d| d.to_rfc3339()),
            dialogue.retry_count,
            dialogue.max_retries,
            dialogue.last_user_response_at.map(|d| d.to_rfc3339()),
            dialogue.interest_score,
            dialogue.link_sent_count,
            dialogue.fail_reason,
            dialogue.needs_review as i64,
            dialogue.creative_sent as i64,
        ],
    )?;
    replace_messages(conn, dialogue.meta.id, &dialogue.messages)?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Dialogue>, RepoError> {
    let dialogue = conn
        .query_row(&format!("SELECT {COLUMNS} FROM dialogues WHERE id = ?1"), params![id.to_string()], from_row)
        .optional()?;
    match dialogue {
        Some(mut dialogue) => {
            dialogue.messages = load_messages(conn, id)?;
            Ok(Some(dialogue))
        }
        None => Ok(None),
    }
}

/// Dialogues due for a worker pass: `next_action_at` has elapsed and the
/// status isn't terminal.
pub fn list_due(conn: &Connection, account_id: Uuid, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Dialogue>, RepoError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM dialogues WHERE account_id = ?1 AND status NOT IN ('completed','failed','expired') \
         AND (next_action_at IS NULL OR next_action_at <= ?2)"
    ))?;
    let rows = stmt.query_map(params![account_id.to_string(), now.to_rfc3339()], from_row)?;
    let mut dialogues = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    for dialogue in &mut dialogues {
        dialogue.messages = load_messages(conn, dialogue.meta.id)?;
    }
    Ok(dialogues)
}

pub fn list_by_account(conn: &Connection, account_id: Uuid) -> Result<Vec<Dialogue>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM dialogues WHERE account_id = ?1"))?;
    let rows = stmt.query_map(params![account_id.to_string()], from_row)?;
    let mut dialogues = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    for dialogue in &mut dialogues {
        dialogue.messages = load_messages(conn, dialogue.meta.id)?;
    }
    Ok(dialogues)
}

pub fn save(conn: &Connection, dialogue: &mut Dialogue, check_version: bool) -> Result<(), RepoError> {
    let (expected, next) = next_version(&mut dialogue.meta);
    let rows = if check_version {
        conn.execute(
            "UPDATE dialogues SET updated_at=?1, version=?2, telegram_username=?3, status=?4, \
             goal_message_sent=?5, goal_message_sent_at=?6, next_action_at=?7, retry_count=?8, \
             max_retries=?9, last_user_response_at=?10, interest_score=?11, link_sent_count=?12, \
             fail_reason=?13, needs_review=?14, creative_sent=?15 WHERE id = ?16 AND version = ?17",
            params![
                dialogue.meta.updated_at.to_rfc3339(),
                next,
                dialogue.telegram_username,
                status_str(dialogue.status),
                dialogue.goal_message_sent as i64,
                dialogue.goal_message_sent_at.map(|d| d.to_rfc3339()),
                dialogue.next_action_at.map(|d| d.to_rfc3339()),
                dialogue.retry_count,
                dialogue.max_retries,
                dialogue.last_user_response_at.map(|d| d.to_rfc3339()),
                dialogue.interest_score,
                dialogue.link_sent_count,
                dialogue.fail_reason,
                dialogue.needs_review as i64,
                dialogue.creative_sent as i64,
                dialogue.meta.id.to_string(),
                expected,
            ],
        )?
    } else {
        conn.execute(
            "UPDATE dialogues SET updated_at=?1, version=?2, telegram_username=?3, status=?4, \
             goal_message_sent=?5, goal_message_sent_at=?6, next_action_at=?7, retry_count=?8, \
             max_retries=?9, last_user_response_at=?10, interest_score=?11, link_sent_count=?12, \
             fail_reason=?13, needs_review=?14, creative_sent=?15 WHERE id = ?16",
            params![
                dialogue.meta.updated_at.to_rfc3339(),
                next,
                dialogue.telegram_username,
                status_str(dialogue.status),
                dialogue.goal_message_sent as i64,
                dialogue.goal_message_sent_at.map(|d| d.to_rfc3339()),
                dialogue.next_action_at.map(|d| d.to_rfc3339()),
                dialogue.retry_count,
                dialogue.max_retries,
                dialogue.last_user_response_at.map(|d| d.to_rfc3339()),
                dialogue.interest_score,
                dialogue.link_sent_count,
                dialogue.fail_reason,
                dialogue.needs_review as i64,
                dialogue.creative_sent as i64,
                dialogue.meta.id.to_string(),
            ],
        )?
    };
    replace_messages(conn, dialogue.meta.id, &dialogue.messages)?;
    if check_version {
        super::apply_version_bump("dialogue", &mut dialogue.meta, rows, next)
    } else {
        dialogue.meta.version = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    fn sample() -> Dialogue {
        Dialogue::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 42)
    }

    #[test]
    fn round_trips_messages_in_order() {
        let conn = open_memory().unwrap();
        let mut dialogue = sample();
        dialogue.mark_initiated();
        dialogue.add_message(MessageRole::Account, "привет".into(), None, false, 0, false).unwrap();
        dialogue.add_message(MessageRole::User, "хай".into(), None, false, 0, false).unwrap();
        create(&conn, &dialogue).unwrap();

        let loaded = get(&conn, dialogue.meta.id).unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "привет");
        assert_eq!(loaded.status, DialogueStatus::Active);
    }

    #[test]
    fn unchecked_save_ignores_stale_version() {
        let conn = open_memory().unwrap();
        let dialogue = sample();
        create(&conn, &dialogue).unwrap();

        let mut stale = get(&conn, dialogue.meta.id).unwrap().unwrap();
        stale.meta.version = 999;
        let result = save(&conn, &mut stale, false);
        assert!(result.is_ok());
    }
}
