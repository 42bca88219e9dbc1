//! Account persistence. `schedule`/`limits` are stored as JSON blobs —
//! neither is queried by column, only ever loaded whole, so a join-free
//! text column beats five-plus extra columns the way `chat_sessions.summary`
//! does as a free-text field for its own write-mostly data.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{Account, AccountLimits, AccountSchedule, AccountSource, AccountStatus};

use super::{next_version, parse_dt_opt, parse_uuid};

fn status_str(s: AccountStatus) -> &'static str {
    match s {
        AccountStatus::Inactive => "inactive",
        AccountStatus::Ready => "ready",
        AccountStatus::Active => "active",
        AccountStatus::Paused => "paused",
        AccountStatus::Error => "error",
        AccountStatus::Banned => "banned",
        AccountStatus::Cooldown => "cooldown",
    }
}

fn parse_status(s: &str) -> AccountStatus {
    match s {
        "ready" => AccountStatus::Ready,
        "active" => AccountStatus::Active,
        "paused" => AccountStatus::Paused,
        "error" => AccountStatus::Error,
        "banned" => AccountStatus::Banned,
        "cooldown" => AccountStatus::Cooldown,
        _ => AccountStatus::Inactive,
    }
}

fn source_str(s: AccountSource) -> &'static str {
    match s {
        AccountSource::Phone => "phone",
        AccountSource::JsonSession => "json_session",
        AccountSource::Tdata => "tdata",
    }
}

fn parse_source(s: &str) -> AccountSource {
    match s {
        "json_session" => AccountSource::JsonSession,
        "tdata" => AccountSource::Tdata,
        _ => AccountSource::Phone,
    }
}

fn from_row(row: &Row) -> rusqlite::Result<Account> {
    let meta = super::read_meta(row, 0, 1, 2, 3)?;
    let proxy_id: Option<String> = row.get(6)?;
    let telegram_app_id: Option<String> = row.get(7)?;
    let campaign_id: Option<String> = row.get(12)?;
    let schedule_json: String = row.get(10)?;
    let limits_json: String = row.get(11)?;
    Ok(Account {
        meta,
        phone: row.get(4)?,
        session_data: row.get(5)?,
        proxy_id: proxy_id.map(|s| parse_uuid(&s)).transpose()?,
        telegram_app_id: telegram_app_id.map(|s| parse_uuid(&s)).transpose()?,
        source: parse_source(&row.get::<_, String>(8)?),
        status: parse_status(&row.get::<_, String>(9)?),
        schedule: serde_json::from_str::<AccountSchedule>(&schedule_json)
            .unwrap_or_default(),
        limits: serde_json::from_str::<AccountLimits>(&limits_json).unwrap_or_default(),
        campaign_id: campaign_id.map(|s| parse_uuid(&s)).transpose()?,
        telegram_id: row.get(13)?,
        username: row.get(14)?,
        first_name: row.get(15)?,
        last_name: row.get(16)?,
        bio: row.get(17)?,
        is_premium: row.get::<_, i64>(18)? != 0,
        daily_conversations_count: row.get(19)?,
        hourly_messages_count: row.get(20)?,
        hourly_responses_count: row.get(21)?,
        total_messages_sent: row.get::<_, i64>(22)? as u64,
        total_conversations_started: row.get::<_, i64>(23)? as u64,
        last_daily_reset: parse_dt_opt(row.get(24)?)?,
        last_hourly_reset: parse_dt_opt(row.get(25)?)?,
        last_activity: parse_dt_opt(row.get(26)?)?,
        error_message: row.get(27)?,
    })
}

const COLUMNS: &str = "id, created_at, updated_at, version, phone, session_data, proxy_id, \
    telegram_app_id, source, status, schedule_json, limits_json, campaign_id, telegram_id, \
    username, first_name, last_name, bio, is_premium, daily_conversations_count, \
    hourly_messages_count, hourly_responses_count, total_messages_sent, \
    total_conversations_started, last_daily_reset, last_hourly_reset, last_activity, error_message";

pub fn create(conn: &Connection, account: &Account) -> Result<(), RepoError> {
    conn.execute(
        &format!("INSERT INTO accounts ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27,?28)"),
        params![
            account.meta.id.to_string(),
            account.meta.created_at.to_rfc3339(),
            account.meta.updated_at.to_rfc3339(),
            account.meta.version,
            account.phone,
            account.session_data,
            account.proxy_id.map(|u| u.to_string()),
            account.telegram_app_id.map(|u| u.to_string()),
            source_str(account.source),
            status_str(account.status),
            serde_json::to_string(&account.schedule).unwrap(),
            serde_json::to_string(&account.limits).unwrap(),
            account.campaign_id.map(|u| u.to_string()),
            account.telegram_id,
            account.username,
            account.first_name,
            account.last_name,
            account.bio,
            account.is_premium as i64,
            account.daily_conversations_count,
            account.hourly_messages_count,
            account.hourly_responses_count,
            account.total_messages_sent as i64,
            account.total_conversations_started as i64,
            account.last_daily_reset.map(|d| d.to_rfc3339()),
            account.last_hourly_reset.map(|d| d.to_rfc3339()),
            account.last_activity.map(|d| d.to_rfc3339()),
            account.error_message,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Account>, RepoError> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM accounts WHERE id = ?1"),
            params![id.to_string()],
            from_row,
        )
        .optional()?)
}

pub fn list_by_status(conn: &Connection, status: AccountStatus) -> Result<Vec<Account>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM accounts WHERE status = ?1"))?;
    let rows = stmt.query_map(params![status_str(status)], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_by_campaign(conn: &Connection, campaign_id: Uuid) -> Result<Vec<Account>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM accounts WHERE campaign_id = ?1"))?;
    let rows = stmt.query_map(params![campaign_id.to_string()], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Account>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM accounts"))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Optimistic-locked update: fails with `RepoError::OptimisticLock` if
/// `account.meta.version` no longer matches the stored row.
pub fn save(conn: &Connection, account: &mut Account) -> Result<(), RepoError> {
    let (expected, next) = next_version(&mut account.meta);
    let rows = conn.execute(
        "UPDATE accounts SET updated_at=?1, version=?2, phone=?3, session_data=?4, proxy_id=?5, \
         telegram_app_id=?6, source=?7, status=?8, schedule_json=?9, limits_json=?10, \
         campaign_id=?11, telegram_id=?12, username=?13, first_name=?14, last_name=?15, bio=?16, \
         is_premium=?17, daily_conversations_count=?18, hourly_messages_count=?19, \
         hourly_responses_count=?20, total_messages_sent=?21, total_conversations_started=?22, \
         last_daily_reset=?23, last_hourly_reset=?24, last_activity=?25, error_message=?26 \
         WHERE id = ?27 AND version = ?28",
        params![
            account.meta.updated_at.to_rfc3339(),
            next,
            account.phone,
            account.session_data,
            account.proxy_id.map(|u| u.to_string()),
            account.telegram_app_id.map(|u| u.to_string()),
            source_str(account.source),
            status_str(account.status),
            serde_json::to_string(&account.schedule).unwrap(),
            serde_json::to_string(&account.limits).unwrap(),
            account.campaign_id.map(|u| u.to_string()),
            account.telegram_id,
            account.username,
            account.first_name,
            account.last_name,
            account.bio,
            account.is_premium as i64,
            account.daily_conversations_count,
            account.hourly_messages_count,
            account.hourly_responses_count,
            account.total_messages_sent as i64,
            account.total_conversations_started as i64,
            account.last_daily_reset.map(|d| d.to_rfc3339()),
            account.last_hourly_reset.map(|d| d.to_rfc3339()),
            account.last_activity.map(|d| d.to_rfc3339()),
            account.error_message,
            account.meta.id.to_string(),
            expected,
        ],
    )?;
    super::apply_version_bump("account", &mut account.meta, rows, next)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<(), RepoError> {
    conn.execute("DELETE FROM accounts WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    #[test]
    fn round_trips_an_account() {
        let conn = open_memory().unwrap();
        let account = Account::new("+15551234567".into(), AccountSource::Phone);
        create(&conn, &account).unwrap();
        let loaded = get(&conn, account.meta.id).unwrap().unwrap();
        assert_eq!(loaded.phone, "+15551234567");
        assert_eq!(loaded.status, AccountStatus::Inactive);
    }

    #[test]
    fn concurrent_saves_detect_version_conflict() {
        let conn = open_memory().unwrap();
        let account = Account::new("+1".into(), AccountSource::Phone);
        create(&conn, &account).unwrap();

        let mut first = get(&conn, account.meta.id).unwrap().unwrap();
        let mut second = get(&conn, account.meta.id).unwrap().unwrap();

        first.activate().unwrap();
        save(&conn, &mut first).unwrap();

        second.pause();
        let result = save(&conn, &mut second);
        assert!(matches!(result, Err(RepoError::OptimisticLock { .. })));
    }
}
