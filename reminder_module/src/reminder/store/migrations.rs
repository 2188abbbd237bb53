use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use tracing::{info, warn};

use super::super::types::ReminderError;
use super::super::utils::format_datetime;

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, ReminderError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }
    Ok(columns)
}

pub(super) fn ensure_scheduled_message_columns(conn: &Connection) -> Result<(), ReminderError> {
    let columns = table_columns(conn, "scheduled_messages")?;

    if !columns.contains("created_at") {
        conn.execute(
            "ALTER TABLE scheduled_messages ADD COLUMN created_at TEXT",
            [],
        )?;
    }
    if !columns.contains("claim_token") {
        conn.execute(
            "ALTER TABLE scheduled_messages ADD COLUMN claim_token TEXT",
            [],
        )?;
    }
    if !columns.contains("claimed_at") {
        conn.execute(
            "ALTER TABLE scheduled_messages ADD COLUMN claimed_at TEXT",
            [],
        )?;
    }
    Ok(())
}

/// Stamps rows written before `created_at` existed with the migration time.
/// Runs once per store, from `SqliteMessageStore::new`.
pub(super) fn backfill_created_at(conn: &Connection) -> Result<(), ReminderError> {
    let missing: bool = conn.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM scheduled_messages WHERE created_at IS NULL OR created_at = ''
         )",
        [],
        |row| row.get(0),
    )?;
    if missing {
        let backfilled = conn.execute(
            "UPDATE scheduled_messages SET created_at = ?1
             WHERE created_at IS NULL OR created_at = ''",
            params![format_datetime(Utc::now())],
        )?;
        info!("backfilled created_at on {} scheduled messages", backfilled);
    }
    Ok(())
}

/// Older databases may already hold duplicate `(patient_ref, scheduled_date)`
/// rows; the index is skipped for them and the insert pre-check still applies.
/// Runs once per store, from `SqliteMessageStore::new`.
pub(super) fn ensure_unique_reminder_index(conn: &Connection) -> Result<(), ReminderError> {
    if let Err(err) = conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_scheduled_messages_patient_date
         ON scheduled_messages (patient_ref, scheduled_date)",
        [],
    ) {
        warn!("unique reminder index unavailable: {}", err);
    }
    Ok(())
}

pub(super) fn ensure_message_log_columns(conn: &Connection) -> Result<(), ReminderError> {
    let columns = table_columns(conn, "message_log")?;

    if !columns.contains("outcome_detail") {
        conn.execute("ALTER TABLE message_log ADD COLUMN outcome_detail TEXT", [])?;
    }
    Ok(())
}
