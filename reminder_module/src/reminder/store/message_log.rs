use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::super::types::{
    AuditStatus, MessageLogEntry, NewLogEntry, ReminderError, ReviewNotes, TransitionOutcome,
};
use super::super::utils::{bool_to_int, format_datetime, parse_datetime, parse_optional_datetime};
use super::SqliteMessageStore;

const LOG_COLUMNS: &str = "id, patient_ref, phone_number, message, status, edited, reason_edited, \
     regenerated, reason_regenerated, created_at, sent_at, outcome_detail";

/// Audit trail of manually triggered messages, stored next to the
/// scheduled reminders.
#[derive(Debug, Clone)]
pub struct MessageLogStore {
    store: SqliteMessageStore,
}

struct LogRow {
    id: i64,
    patient_ref: String,
    phone_number: String,
    message: String,
    status: String,
    edited: i64,
    reason_edited: Option<String>,
    regenerated: i64,
    reason_regenerated: Option<String>,
    created_at: String,
    sent_at: Option<String>,
    outcome_detail: Option<String>,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_ref: row.get(1)?,
            phone_number: row.get(2)?,
            message: row.get(3)?,
            status: row.get(4)?,
            edited: row.get(5)?,
            reason_edited: row.get(6)?,
            regenerated: row.get(7)?,
            reason_regenerated: row.get(8)?,
            created_at: row.get(9)?,
            sent_at: row.get(10)?,
            outcome_detail: row.get(11)?,
        })
    }

    fn into_entry(self) -> Result<MessageLogEntry, ReminderError> {
        Ok(MessageLogEntry {
            id: self.id,
            patient_ref: self.patient_ref,
            phone_number: self.phone_number,
            message: self.message,
            status: self.status.parse()?,
            review: ReviewNotes {
                edited: self.edited != 0,
                reason_edited: self.reason_edited,
                regenerated: self.regenerated != 0,
                reason_regenerated: self.reason_regenerated,
            },
            created_at: parse_datetime(&self.created_at)?,
            sent_at: parse_optional_datetime(self.sent_at.as_deref())?,
            outcome_detail: self.outcome_detail,
        })
    }
}

impl MessageLogStore {
    pub fn new(store: SqliteMessageStore) -> Self {
        Self { store }
    }

    pub fn create(&self, entry: &NewLogEntry) -> Result<MessageLogEntry, ReminderError> {
        let conn = self.store.open()?;
        conn.execute(
            "INSERT INTO message_log
                (patient_ref, phone_number, message, status, edited, reason_edited,
                 regenerated, reason_regenerated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.patient_ref,
                entry.phone_number,
                entry.message,
                AuditStatus::NotSent.as_str(),
                bool_to_int(entry.review.edited),
                entry.review.reason_edited,
                bool_to_int(entry.review.regenerated),
                entry.review.reason_regenerated,
                format_datetime(entry.created_at),
            ],
        )?;
        Ok(MessageLogEntry {
            id: conn.last_insert_rowid(),
            patient_ref: entry.patient_ref.clone(),
            phone_number: entry.phone_number.clone(),
            message: entry.message.clone(),
            status: AuditStatus::NotSent,
            review: entry.review.clone(),
            created_at: entry.created_at,
            sent_at: None,
            outcome_detail: None,
        })
    }

    /// Settles a NOT_SENT entry as SENT or FAILED. A completed entry is left
    /// untouched.
    pub fn complete(
        &self,
        id: i64,
        delivered: bool,
        detail: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome<AuditStatus>, ReminderError> {
        let status = if delivered {
            AuditStatus::Sent
        } else {
            AuditStatus::Failed
        };
        let mut conn = self.store.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE message_log
             SET status = ?1, sent_at = ?2, outcome_detail = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                status.as_str(),
                format_datetime(sent_at),
                detail,
                id,
                AuditStatus::NotSent.as_str()
            ],
        )?;
        if updated == 1 {
            tx.commit()?;
            return Ok(TransitionOutcome::Applied);
        }
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM message_log WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;
        match current {
            Some(raw) => Ok(TransitionOutcome::AlreadyFinal(raw.parse()?)),
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    pub fn get(&self, id: i64) -> Result<Option<MessageLogEntry>, ReminderError> {
        let conn = self.store.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM message_log WHERE id = ?1", LOG_COLUMNS),
                params![id],
                LogRow::from_row,
            )
            .optional()?;
        row.map(LogRow::into_entry).transpose()
    }

    pub fn list_by_patient(&self, patient_ref: &str) -> Result<Vec<MessageLogEntry>, ReminderError> {
        let conn = self.store.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM message_log WHERE patient_ref = ?1 ORDER BY id",
            LOG_COLUMNS
        ))?;
        let rows = stmt.query_map(params![patient_ref], LogRow::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    pub fn latest_by_patient(
        &self,
        patient_ref: &str,
    ) -> Result<Option<MessageLogEntry>, ReminderError> {
        let conn = self.store.open()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM message_log WHERE patient_ref = ?1 ORDER BY id DESC LIMIT 1",
                    LOG_COLUMNS
                ),
                params![patient_ref],
                LogRow::from_row,
            )
            .optional()?;
        row.map(LogRow::into_entry).transpose()
    }
}
