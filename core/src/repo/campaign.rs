//! Campaign persistence. `goal`/`prompt`/`stats`/`sending`/`ai` are each
//! stored as a JSON blob — none of them are filtered on by column, and
//! campaigns are low-cardinality compared to accounts/dialogues, so the
//! simplicity outweighs the query flexibility a fully columnar layout would
//! buy.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::RepoError;
use crate::model::{
    Campaign, CampaignAiSettings, CampaignGoal, CampaignPrompt, CampaignSending, CampaignStats,
    CampaignStatus,
};

use super::{next_version, parse_dt_opt, parse_uuid};

fn status_str(s: CampaignStatus) -> &'static str {
    match s {
        CampaignStatus::Draft => "draft",
        CampaignStatus::Ready => "ready",
        CampaignStatus::Active => "active",
        CampaignStatus::Paused => "paused",
        CampaignStatus::Completed => "completed",
        CampaignStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> CampaignStatus {
    match s {
        "ready" => CampaignStatus::Ready,
        "active" => CampaignStatus::Active,
        "paused" => CampaignStatus::Paused,
        "completed" => CampaignStatus::Completed,
        "cancelled" => CampaignStatus::Cancelled,
        _ => CampaignStatus::Draft,
    }
}

const COLUMNS: &str = "id, created_at, updated_at, version, name, description, status, \
    goal_json, prompt_json, stats_json, sending_json, ai_json, account_ids_json, start_date, end_date";

fn from_row(row: &Row) -> rusqlite::Result<Campaign> {
    let meta = super::read_meta(row, 0, 1, 2, 3)?;
    let account_ids_json: String = row.get(12)?;
    let account_ids: Vec<String> = serde_json::from_str(&account_ids_json).unwrap_or_default();
    let account_ids = account_ids
        .into_iter()
        .filter_map(|s| Uuid::parse_str(&s).ok())
        .collect();
    Ok(Campaign {
        meta,
        name: row.get(4)?,
        description: row.get(5)?,
        status: parse_status(&row.get::<_, String>(6)?),
        goal: serde_json::from_str::<CampaignGoal>(&row.get::<_, String>(7)?).unwrap_or_default(),
        prompt: serde_json::from_str::<CampaignPrompt>(&row.get::<_, String>(8)?).unwrap_or_default(),
        stats: serde_json::from_str::<CampaignStats>(&row.get::<_, String>(9)?).unwrap_or_default(),
        sending: serde_json::from_str::<CampaignSending>(&row.get::<_, String>(10)?).unwrap_or_default(),
        ai: serde_json::from_str::<CampaignAiSettings>(&row.get::<_, String>(11)?).unwrap_or_default(),
        account_ids,
        start_date: parse_dt_opt(row.get(13)?)?,
        end_date: parse_dt_opt(row.get(14)?)?,
    })
}

fn account_ids_json(campaign: &Campaign) -> String {
    let ids: Vec<String> = campaign.account_ids.iter().map(|u| u.to_string()).collect();
    serde_json::to_string(&ids).unwrap()
}

pub fn create(conn: &Connection, campaign: &Campaign) -> Result<(), RepoError> {
    conn.execute(
        &format!("INSERT INTO campaigns ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)"),
        params![
            campaign.meta.id.to_string(),
            campaign.meta.created_at.to_rfc3339(),
            campaign.meta.updated_at.to_rfc3339(),
            campaign.meta.version,
            campaign.name,
            campaign.description,
            status_str(campaign.status),
            serde_json::to_string(&campaign.goal).unwrap(),
            serde_json::to_string(&campaign.prompt).unwrap(),
            serde_json::to_string(&campaign.stats).unwrap(),
            serde_json::to_string(&campaign.sending).unwrap(),
            serde_json::to_string(&campaign.ai).unwrap(),
            account_ids_json(campaign),
            campaign.start_date.map(|d| d.to_rfc3339()),
            campaign.end_date.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Campaign>, RepoError> {
    Ok(conn
        .query_row(&format!("SELECT {COLUMNS} FROM campaigns WHERE id = ?1"), params![id.to_string()], from_row)
        .optional()?)
}

pub fn list_active(conn: &Connection) -> Result<Vec<Campaign>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM campaigns WHERE status = 'active'"))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Campaign>, RepoError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM campaigns"))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn save(conn: &Connection, campaign: &mut Campaign) -> Result<(), RepoError> {
    let (expected, next) = next_version(&mut campaign.meta);
    let rows = conn.execute(
        "UPDATE campaigns SET updated_at=?1, version=?2, name=?3, description=?4, status=?5, \
         goal_json=?6, prompt_json=?7, stats_json=?8, sending_json=?9, ai_json=?10, \
         account_ids_json=?11, start_date=?12, end_date=?13 WHERE id = ?14 AND version = ?15",
        params![
            campaign.meta.updated_at.to_rfc3339(),
            next,
            campaign.name,
            campaign.description,
            status_str(campaign.status),
            serde_json::to_string(&campaign.goal).unwrap(),
            serde_json::to_string(&campaign.prompt).unwrap(),
            serde_json::to_string(&campaign.stats).unwrap(),
            serde_json::to_string(&campaign.sending).unwrap(),
            serde_json::to_string(&campaign.ai).unwrap(),
            account_ids_json(campaign),
            campaign.start_date.map(|d| d.to_rfc3339()),
            campaign.end_date.map(|d| d.to_rfc3339()),
            campaign.meta.id.to_string(),
            expected,
        ],
    )?;
    super::apply_version_bump("campaign", &mut campaign.meta, rows, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;

    #[test]
    fn activation_persists_across_reload() {
        let conn = open_memory().unwrap();
        let mut campaign = Campaign::new("spring".into());
        campaign.prompt.system_prompt = "hi".into();
        campaign.account_ids.push(Uuid::new_v4());
        create(&conn, &campaign).unwrap();

        let mut loaded = get(&conn, campaign.meta.id).unwrap().unwrap();
        loaded.activate().unwrap();
        save(&conn, &mut loaded).unwrap();

        let reloaded = get(&conn, campaign.meta.id).unwrap().unwrap();
        assert_eq!(reloaded.status, CampaignStatus::Active);
        assert_eq!(reloaded.account_ids.len(), 1);
    }
}
