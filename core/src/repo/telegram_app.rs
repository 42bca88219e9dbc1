//! TelegramApp (API credential) persistence — the smallest aggregate, kept
//! to the same shape as the rest for consistency.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::TelegramApp;

use super::next_version;

const COLUMNS: &str =
    "id, created_at, updated_at, version, api_id, api_hash, name, max_accounts, current_account_count, is_active";

fn from_row(row: &Row) -> rusqlite::Result<TelegramApp> {
    let meta = super::read_meta(row, 0, 1, 2, 3)?;
    Ok(TelegramApp {
        meta,
        api_id: row.get(4)?,
        api_hash: row.get(5)?,
        name: row.get(6)?,
        max_accounts: row.get(7)?,
        current_account_count: row.get(8)?,
        is_active: row.get::<_, i64>(9)? != 0,
    })
}

pub fn create(conn: &Connection, app: &TelegramApp) -> Result<(), RepoError> {
    conn.execute(
        &format!("INSERT INTO telegram_apps ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"),
        params![
            app.meta.id.to_string(),
            app.meta.created_at.to_rfc3339(),
            app.meta.updated_at.to_rfc3339(),
            app.meta.version,
            app.api_id,
            app.api_hash,
            app.name,
            app.max_accounts,
            app.current_account_count,
            app.is_active as i64,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<TelegramApp>, RepoError> {
    Ok(conn
        .query_row(&format!("SELECT {COLUMNS} FROM telegram_apps WHERE id = ?1"), params![id.to_string()], from_row)
        .optional()?)
}

pub fn list_available(conn: &Connection) -> Result<Vec<TelegramApp>, RepoError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM telegram_apps WHERE is_active = 1 AND current_account_count < max_accounts"
    ))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_all(conn: &Connection) -> Result<Vec<TelegramApp>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM telegram_apps"))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn save(conn: &Connection, app: &mut TelegramApp) -> Result<(), RepoError> {
    let (expected, next) = next_version(&mut app.meta);
    let rows = conn.execute(
        "UPDATE telegram_apps SET updated_at=?1, version=?2, api_id=?3, api_hash=?4, name=?5, \
         max_accounts=?6, current_account_count=?7, is_active=?8 WHERE id = ?9 AND version = ?10",
        params![
            app.meta.updated_at.to_rfc3339(),
            next,
            app.api_id,
            app.api_hash,
            app.name,
            app.max_accounts,
            app.current_account_count,
            app.is_active as i64,
            app.meta.id.to_string(),
            expected,
        ],
    )?;
    super::apply_version_bump("telegram_app", &mut app.meta, rows, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    #[test]
    fn full_app_excluded_from_available_list() {
        let conn = open_memory().unwrap();
        let mut app = TelegramApp::new(1, "hash".into(), "main".into());
        app.max_accounts = 1;
        app.current_account_count = 1;
        create(&conn, &app).unwrap();
        assert!(list_available(&conn).unwrap().is_empty());
    }
}
