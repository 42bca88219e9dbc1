//! UserTarget persistence, plus the campaign-scoped lookups the worker's
//! distribution job needs (pending targets to assign, in-progress targets
//! to follow up on).

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{TargetStatus, UserTarget};

use super::{next_version, parse_dt_opt, parse_uuid};

fn status_str(s: TargetStatus) -> &'static str {
    match s {
        TargetStatus::Pending => "pending",
        TargetStatus::Assigned => "assigned",
        TargetStatus::Contacted => "contacted",
        TargetStatus::InProgress => "in_progress",
        TargetStatus::Converted => "converted",
        TargetStatus::Completed => "completed",
        TargetStatus::Failed => "failed",
        TargetStatus::Skipped => "skipped",
        TargetStatus::Blocked => "blocked",
    }
}

fn parse_status(s: &str) -> TargetStatus {
    match s {
        "assigned" => TargetStatus::Assigned,
        "contacted" => TargetStatus::Contacted,
        "in_progress" => TargetStatus::InProgress,
        "converted" => TargetStatus::Converted,
        "completed" => TargetStatus::Completed,
        "failed" => TargetStatus::Failed,
        "skipped" => TargetStatus::Skipped,
        "blocked" => TargetStatus::Blocked,
        _ => TargetStatus::Pending,
    }
}

const COLUMNS: &str = "id, created_at, updated_at, version, campaign_id, telegram_id, username, \
    phone, first_name, last_name, status, assigned_account_id, dialogue_id, priority, source, \
    contact_attempts, last_contact_attempt, fail_reason";

fn from_row(row: &Row) -> rusqlite::Result<UserTarget> {
    let meta = super::read_meta(row, 0, 1, 2, 3)?;
    let assigned: Option<String> = row.get(11)?;
    let dialogue_id: Option<String> = row.get(12)?;
    Ok(UserTarget {
        meta,
        campaign_id: parse_uuid(&row.get::<_, String>(4)?)?,
        telegram_id: row.get(5)?,
        username: row.get(6)?,
        phone: row.get(7)?,
        first_name: row.get(8)?,
        last_name: row.get(9)?,
        status: parse_status(&row.get::<_, String>(10)?),
        assigned_account_id: assigned.map(|s| parse_uuid(&s)).transpose()?,
        dialogue_id: dialogue_id.map(|s| parse_uuid(&s)).transpose()?,
        priority: row.get(13)?,
        source: row.get(14)?,
        contact_attempts: row.get(15)?,
        last_contact_attempt: parse_dt_opt(row.get(16)?)?,
        fail_reason: row.get(17)?,
    })
}

pub fn create(conn: &Connection, target: &UserTarget) -> Result<(), RepoError> {
    conn.execute(
        &format!("INSERT INTO targets ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)"),
        params![
            target.meta.id.to_string(),
            target.meta.created_at.to_rfc3339(),
            target.meta.updated_at.to_rfc3339(),
            target.meta.version,
            target.campaign_id.to_string(),
            target.telegram_id,
            target.username,
            target.phone,
            target.first_name,
            target.last_name,
            status_str(target.status),
            target.assigned_account_id.map(|u| u.to_string()),
            target.dialogue_id.map(|u| u.to_string()),
            target.priority,
            target.source,
            target.contact_attempts,
            target.last_contact_attempt.map(|d| d.to_rfc3339()),
            target.fail_reason,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<UserTarget>, RepoError> {
    Ok(conn
        .query_row(&format!("SELECT {COLUMNS} FROM targets WHERE id = ?1"), params![id.to_string()], from_row)
        .optional()?)
}

/// Unassigned targets for a campaign, highest priority first — the pool the
/// distribution job draws from.
pub fn list_pending(conn: &Connection, campaign_id: Uuid, limit: u32) -> Result<Vec<UserTarget>, RepoError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM targets WHERE campaign_id = ?1 AND status = 'pending' \
         ORDER BY priority DESC, created_at ASC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![campaign_id.to_string(), limit], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_by_account(conn: &Connection, account_id: Uuid) -> Result<Vec<UserTarget>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM targets WHERE assigned_account_id = ?1"))?;
    let rows = stmt.query_map(params![account_id.to_string()], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn save(conn: &Connection, target: &mut UserTarget) -> Result<(), RepoError> {
    let (expected, next) = next_version(&mut target.meta);
    let rows = conn.execute(
        "UPDATE targets SET updated_at=?1, version=?2, telegram_id=?3, username=?4, phone=?5, \
         first_name=?6, last_name=?7, status=?8, assigned_account_id=?9, dialogue_id=?10, \
         priority=?11, source=?12, contact_attempts=?13, last_contact_attempt=?14, fail_reason=?15 \
         WHERE id = ?16 AND version = ?17",
        params![
            target.meta.updated_at.to_rfc3339(),
            next,
            target.telegram_id,
            target.username,
            target.phone,
            target.first_name,
            target.last_name,
            status_str(target.status),
            target.assigned_account_id.map(|u| u.to_string()),
            target.dialogue_id.map(|u| u.to_string()),
            target.priority,
            target.source,
            target.contact_attempts,
            target.last_contact_attempt.map(|d| d.to_rfc3339()),
            target.fail_reason,
            target.meta.id.to_string(),
            expected,
        ],
    )?;
    super::apply_version_bump("target", &mut target.meta, rows, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    #[test]
    fn pending_list_is_priority_ordered() {
        let conn = open_memory().unwrap();
        let campaign_id = Uuid::new_v4();
        let mut low = UserTarget::new(campaign_id, Some(1), None, None).unwrap();
        low.priority = 0;
        let mut high = UserTarget::new(campaign_id, Some(2), None, None).unwrap();
        high.priority = 10;
        create(&conn, &low).unwrap();
        create(&conn, &high).unwrap();

        let pending = list_pending(&conn, campaign_id, 10).unwrap();
        assert_eq!(pending[0].telegram_id, Some(2));
    }
}
