//! Persistence (C2/§9): one module per aggregate, each a set of plain
//! functions over `&rusqlite::Connection` — grounded on `project.rs`'s
//! shape (`create_project`/`get_project`/`list_projects`, no
//! repository struct or trait wrapping the connection). Generalized here
//! with optimistic-concurrency saves: every `save_*` reads the row's current
//! `version`, and if the caller's in-memory `version` doesn't match, returns
//! `RepoError::OptimisticLock` instead of overwriting a concurrent write.
//!
//! Per §9's "optimistic locking vs domain-layer version bumps", domain
//! methods only ever call `touch()`; bumping `version` happens here, once,
//! on a successful save. `save_dialogue` takes an explicit `check_version`
//! flag because the worker's per-dialogue mutex already serializes writes
//! to a given dialogue, making the version check redundant overhead on the
//! pipeline's hot path.

pub mod account;
pub mod campaign;
pub mod dialogue;
pub mod proxy;
pub mod target;
pub mod telegram_app;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::EntityMeta;

fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_dt(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_dt_opt(s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_dt(&s)).transpose()
}

fn read_meta(row: &rusqlite::Row, id_idx: usize, created_idx: usize, updated_idx: usize, version_idx: usize) -> rusqlite::Result<EntityMeta> {
    let id: String = row.get(id_idx)?;
    let created_at: String = row.get(created_idx)?;
    let updated_at: String = row.get(updated_idx)?;
    let version: i64 = row.get(version_idx)?;
    Ok(EntityMeta {
        id: parse_uuid(&id)?,
        created_at: parse_dt(&created_at)?,
        updated_at: parse_dt(&updated_at)?,
        version,
    })
}

/// Bumps `meta.version`/`meta.updated_at` the way a successful save always
/// does, hands the caller `(expected_version, next_version)` to bind into its
/// own `UPDATE ... SET version = ?next WHERE id = ?id [AND version = ?expected]`,
/// and turns a zero-row update into `RepoError::OptimisticLock`.
fn apply_version_bump(
    entity: &'static str,
    meta: &mut EntityMeta,
    rows_affected: usize,
    next_version: i64,
) -> Result<(), RepoError> {
    if rows_affected == 0 {
        return Err(RepoError::OptimisticLock {
            entity,
            id: meta.id.to_string(),
        });
    }
    meta.version = next_version;
    Ok(())
}

fn next_version(meta: &mut EntityMeta) -> (i64, i64) {
    let expected = meta.version;
    meta.touch();
    (expected, expected + 1)
}
