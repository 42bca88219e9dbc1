//! Proxy persistence, mirroring [`super::account`]'s column-per-field plus
//! optimistic-version-on-save shape.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{Proxy, ProxyStatus, ProxyType};

use super::{next_version, parse_dt_opt, parse_uuid};

fn type_str(t: ProxyType) -> &'static str {
    match t {
        ProxyType::Socks5 => "socks5",
        ProxyType::Socks4 => "socks4",
        ProxyType::Http => "http",
        ProxyType::Https => "https",
        ProxyType::Mtproto => "mtproto",
    }
}

fn parse_type(s: &str) -> ProxyType {
    match s {
        "socks4" => ProxyType::Socks4,
        "http" => ProxyType::Http,
        "https" => ProxyType::Https,
        "mtproto" => ProxyType::Mtproto,
        _ => ProxyType::Socks5,
    }
}

fn status_str(s: ProxyStatus) -> &'static str {
    match s {
        ProxyStatus::Unknown => "unknown",
        ProxyStatus::Active => "active",
        ProxyStatus::Slow => "slow",
        ProxyStatus::Unavailable => "unavailable",
        ProxyStatus::Banned => "banned",
    }
}

fn parse_status(s: &str) -> ProxyStatus {
    match s {
        "active" => ProxyStatus::Active,
        "slow" => ProxyStatus::Slow,
        "unavailable" => ProxyStatus::Unavailable,
        "banned" => ProxyStatus::Banned,
        _ => ProxyStatus::Unknown,
    }
}

const COLUMNS: &str = "id, created_at, updated_at, version, host, port, proxy_type, username, \
    password, status, assigned_account_id, country, provider, last_check, last_check_latency_ms, \
    failure_count, total_requests";

fn from_row(row: &Row) -> rusqlite::Result<Proxy> {
    let meta = super::read_meta(row, 0, 1, 2, 3)?;
    let assigned: Option<String> = row.get(10)?;
    Ok(Proxy {
        meta,
        host: row.get(4)?,
        port: row.get::<_, i64>(5)? as u16,
        proxy_type: parse_type(&row.get::<_, String>(6)?),
        username: row.get(7)?,
        password: row.get(8)?,
        status: parse_status(&row.get::<_, String>(9)?),
        assigned_account_id: assigned.map(|s| parse_uuid(&s)).transpose()?,
        country: row.get(11)?,
        provider: row.get(12)?,
        last_check: parse_dt_opt(row.get(13)?)?,
        last_check_latency_ms: row.get(14)?,
        failure_count: row.get(15)?,
        total_requests: row.get::<_, i64>(16)? as u64,
    })
}

pub fn create(conn: &Connection, proxy: &Proxy) -> Result<(), RepoError> {
    conn.execute(
        &format!("INSERT INTO proxies ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"),
        params![
            proxy.meta.id.to_string(),
            proxy.meta.created_at.to_rfc3339(),
            proxy.meta.updated_at.to_rfc3339(),
            proxy.meta.version,
            proxy.host,
            proxy.port,
            type_str(proxy.proxy_type),
            proxy.username,
            proxy.password,
            status_str(proxy.status),
            proxy.assigned_account_id.map(|u| u.to_string()),
            proxy.country,
            proxy.provider,
            proxy.last_check.map(|d| d.to_rfc3339()),
            proxy.last_check_latency_ms,
            proxy.failure_count,
            proxy.total_requests as i64,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Proxy>, RepoError> {
    Ok(conn
        .query_row(&format!("SELECT {COLUMNS} FROM proxies WHERE id = ?1"), params![id.to_string()], from_row)
        .optional()?)
}

pub fn list_available(conn: &Connection) -> Result<Vec<Proxy>, RepoError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM proxies WHERE status IN ('active','slow','unknown') AND assigned_account_id IS NULL"
    ))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Proxy>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM proxies"))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn save(conn: &Connection, proxy: &mut Proxy) -> Result<(), RepoError> {
    let (expected, next) = next_version(&mut proxy.meta);
    let rows = conn.execute(
        "UPDATE proxies SET updated_at=?1, version=?2, host=?3, port=?4, proxy_type=?5, \
         username=?6, password=?7, status=?8, assigned_account_id=?9, country=?10, provider=?11, \
         last_check=?12, last_check_latency_ms=?13, failure_count=?14, total_requests=?15 \
         WHERE id = ?16 AND version = ?17",
        params![
            proxy.meta.updated_at.to_rfc3339(),
            next,
            proxy.host,
            proxy.port,
            type_str(proxy.proxy_type),
            proxy.username,
            proxy.password,
            status_str(proxy.status),
            proxy.assigned_account_id.map(|u| u.to_string()),
            proxy.country,
            proxy.provider,
            proxy.last_check.map(|d| d.to_rfc3339()),
            proxy.last_check_latency_ms,
            proxy.failure_count,
            proxy.total_requests as i64,
            proxy.meta.id.to_string(),
            expected,
        ],
    )?;
    super::apply_version_bump("proxy", &mut proxy.meta, rows, next)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<(), RepoError> {
    conn.execute("DELETE FROM proxies WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    #[test]
    fn available_list_excludes_assigned_proxies() {
        let conn = open_memory().unwrap();
        let mut p1 = Proxy::new("1.1.1.1".into(), 1080, ProxyType::Socks5);
        p1.mark_active(100);
        let mut p2 = Proxy::new("2.2.2.2".into(), 1080, ProxyType::Socks5);
        p2.mark_active(100);
        p2.assign_to_account(Uuid::new_v4());
        create(&conn, &p1).unwrap();
        create(&conn, &p2).unwrap();

        let available = list_available(&conn).unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].host, "1.1.1.1");
    }
}
