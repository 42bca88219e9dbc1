//! SQLite database: single connection, WAL mode, all tables created on open.
//! DB file lives at {data_dir}/fleet.db. Grounded on `open_db`/`create_tables`'s
//! shape — single connection, `execute_batch` DDL,
//! `foreign_keys` on — generalized to the fleet's wider entity set.

use std::path::Path;

use rusqlite::Connection;

const DB_FILE: &str = "fleet.db";

/// Open (or create) the SQLite database and ensure all tables exist.
pub fn open_db(data_dir: &Path) -> rusqlite::Result<Connection> {
    std::fs::create_dir_all(data_dir).ok();
    let db_path = data_dir.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    create_tables(&conn)?;
    Ok(conn)
}

/// In-memory database, for tests.
pub fn open_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    create_tables(&conn)?;
    Ok(conn)
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS telegram_apps (
            id                     TEXT PRIMARY KEY,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL,
            version                INTEGER NOT NULL,
            api_id                 INTEGER NOT NULL,
            api_hash               TEXT NOT NULL,
            name                   TEXT NOT NULL,
            max_accounts           INTEGER NOT NULL,
            current_account_count  INTEGER NOT NULL,
            is_active              INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS proxies (
            id                      TEXT PRIMARY KEY,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            version                 INTEGER NOT NULL,
            host                    TEXT NOT NULL,
            port                    INTEGER NOT NULL,
            proxy_type              TEXT NOT NULL,
            username                TEXT,
            password                TEXT,
            status                  TEXT NOT NULL,
            assigned_account_id     TEXT,
            country                 TEXT NOT NULL,
            provider                TEXT NOT NULL,
            last_check              TEXT,
            last_check_latency_ms   INTEGER,
            failure_count           INTEGER NOT NULL,
            total_requests          INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS accounts (
            id                            TEXT PRIMARY KEY,
            created_at                    TEXT NOT NULL,
            updated_at                    TEXT NOT NULL,
            version                       INTEGER NOT NULL,
            phone                         TEXT NOT NULL,
            session_data                  BLOB,
            proxy_id                      TEXT REFERENCES proxies(id),
            telegram_app_id               TEXT REFERENCES telegram_apps(id),
            source                        TEXT NOT NULL,
            status                        TEXT NOT NULL,
            schedule_json                 TEXT NOT NULL,
            limits_json                   TEXT NOT NULL,
            campaign_id                   TEXT,
            telegram_id                   INTEGER,
            username                      TEXT,
            first_name                    TEXT NOT NULL,
            last_name                     TEXT NOT NULL,
            bio                           TEXT NOT NULL,
            is_premium                    INTEGER NOT NULL,
            daily_conversations_count     INTEGER NOT NULL,
            hourly_messages_count         INTEGER NOT NULL,
            hourly_responses_count        INTEGER NOT NULL,
            total_messages_sent           INTEGER NOT NULL,
            total_conversations_started   INTEGER NOT NULL,
            last_daily_reset              TEXT,
            last_hourly_reset             TEXT,
            last_activity                 TEXT,
            error_message                 TEXT
        );

        CREATE TABLE IF NOT EXISTS campaigns (
            id                  TEXT PRIMARY KEY,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            version             INTEGER NOT NULL,
            name                TEXT NOT NULL,
            description         TEXT NOT NULL,
            status              TEXT NOT NULL,
            goal_json           TEXT NOT NULL,
            prompt_json         TEXT NOT NULL,
            stats_json          TEXT NOT NULL,
            sending_json        TEXT NOT NULL,
            ai_json             TEXT NOT NULL,
            account_ids_json    TEXT NOT NULL,
            start_date          TEXT,
            end_date            TEXT
        );

        CREATE TABLE IF NOT EXISTS targets (
            id                     TEXT PRIMARY KEY,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL,
            version                INTEGER NOT NULL,
            campaign_id            TEXT NOT NULL REFERENCES campaigns(id),
            telegram_id            INTEGER,
            username               TEXT,
            phone                  TEXT,
            first_name             TEXT NOT NULL,
            last_name              TEXT NOT NULL,
            status                 TEXT NOT NULL,
            assigned_account_id    TEXT,
            dialogue_id            TEXT,
            priority               INTEGER NOT NULL,
            source                 TEXT NOT NULL,
            contact_attempts       INTEGER NOT NULL,
            last_contact_attempt   TEXT,
            fail_reason            TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_targets_campaign_status ON targets(campaign_id, status);

        CREATE TABLE IF NOT EXISTS dialogues (
            id                       TEXT PRIMARY KEY,
            created_at               TEXT NOT NULL,
            updated_at               TEXT NOT NULL,
            version                  INTEGER NOT NULL,
            account_id               TEXT NOT NULL REFERENCES accounts(id),
            campaign_id              TEXT NOT NULL REFERENCES campaigns(id),
            target_user_id           TEXT NOT NULL REFERENCES targets(id),
            telegram_user_id         INTEGER NOT NULL,
            telegram_username        TEXT,
            status                   TEXT NOT NULL,
            goal_message_sent        INTEGER NOT NULL,
            goal_message_sent_at     TEXT,
            next_action_at           TEXT,
            retry_count              INTEGER NOT NULL,
            max_retries              INTEGER NOT NULL,
            last_user_response_at    TEXT,
            interest_score           INTEGER NOT NULL,
            link_sent_count          INTEGER NOT NULL,
            fail_reason              TEXT,
            needs_review             INTEGER NOT NULL,
            creative_sent            INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dialogues_account_status ON dialogues(account_id, status);
        CREATE INDEX IF NOT EXISTS idx_dialogues_next_action ON dialogues(next_action_at);

        CREATE TABLE IF NOT EXISTS dialogue_messages (
            id                     TEXT PRIMARY KEY,
            dialogue_id            TEXT NOT NULL REFERENCES dialogues(id),
            seq                    INTEGER NOT NULL,
            role                   TEXT NOT NULL,
            content                TEXT NOT NULL,
            timestamp              TEXT NOT NULL,
            telegram_message_id    INTEGER,
            ai_generated           INTEGER NOT NULL,
            tokens_used            INTEGER NOT NULL,
            is_follow_up           INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dialogue_messages_dialogue ON dialogue_messages(dialogue_id, seq);
        ",
    )
}
