use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{
    MessageStatus, NewScheduledMessage, ReminderError, ScheduledMessage, TransitionOutcome,
};
use super::utils::{
    format_date, format_datetime, local_day_bounds, parse_date, parse_datetime,
    parse_optional_datetime,
};

mod message_log;
mod migrations;
mod schema;

pub use message_log::MessageLogStore;

use migrations::{
    backfill_created_at, ensure_message_log_columns, ensure_scheduled_message_columns,
    ensure_unique_reminder_index,
};
use schema::REMINDER_SCHEMA;

const MESSAGE_COLUMNS: &str =
    "id, patient_ref, phone_number, message_body, scheduled_date, status, sent_at, created_at";

/// Durable record of scheduled reminders. Every operation opens its own
/// connection; SQLite serializes concurrent writers.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    path: PathBuf,
}

struct MessageRow {
    id: i64,
    patient_ref: String,
    phone_number: String,
    message_body: String,
    scheduled_date: String,
    status: String,
    sent_at: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_ref: row.get(1)?,
            phone_number: row.get(2)?,
            message_body: row.get(3)?,
            scheduled_date: row.get(4)?,
            status: row.get(5)?,
            sent_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_message(self) -> Result<ScheduledMessage, ReminderError> {
        Ok(ScheduledMessage {
            id: self.id,
            patient_ref: self.patient_ref,
            phone_number: self.phone_number,
            message_body: self.message_body,
            scheduled_date: parse_date(&self.scheduled_date)?,
            status: self.status.parse()?,
            sent_at: parse_optional_datetime(self.sent_at.as_deref())?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl SqliteMessageStore {
    pub fn new(path: PathBuf) -> Result<Self, ReminderError> {
        let store = Self { path };
        let conn = store.open()?;
        backfill_created_at(&conn)?;
        ensure_unique_reminder_index(&conn)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts a SCHEDULED row. Returns `None` when the patient already has a
    /// reminder for that date.
    pub fn insert(
        &self,
        message: &NewScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, ReminderError> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let scheduled_date = format_date(message.scheduled_date);
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM scheduled_messages
                 WHERE patient_ref = ?1 AND scheduled_date = ?2
                 LIMIT 1",
                params![message.patient_ref, scheduled_date],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }

        let inserted = tx.execute(
            "INSERT INTO scheduled_messages
                (patient_ref, phone_number, message_body, scheduled_date, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.patient_ref,
                message.phone_number,
                message.message_body,
                scheduled_date,
                MessageStatus::Scheduled.as_str(),
                format_datetime(message.created_at),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Some(ScheduledMessage {
            id,
            patient_ref: message.patient_ref.clone(),
            phone_number: message.phone_number.clone(),
            message_body: message.message_body.clone(),
            scheduled_date: message.scheduled_date,
            status: MessageStatus::Scheduled,
            sent_at: None,
            created_at: message.created_at,
        }))
    }

    pub fn get(&self, id: i64) -> Result<Option<ScheduledMessage>, ReminderError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM scheduled_messages WHERE id = ?1",
                    MESSAGE_COLUMNS
                ),
                params![id],
                MessageRow::from_row,
            )
            .optional()?;
        row.map(MessageRow::into_message).transpose()
    }

    /// SCHEDULED rows whose `scheduled_date` is exactly `date`, in insertion order.
    pub fn query_due(&self, date: NaiveDate) -> Result<Vec<ScheduledMessage>, ReminderError> {
        let conn = self.open()?;
        self.select(
            &conn,
            "WHERE status = ?1 AND scheduled_date = ?2 ORDER BY id",
            params![MessageStatus::Scheduled.as_str(), format_date(date)],
        )
    }

    /// Reminders targeting the day after `date`, plus anything completed
    /// during `date` in `zone`.
    pub fn query_window(
        &self,
        date: NaiveDate,
        zone: Tz,
    ) -> Result<Vec<ScheduledMessage>, ReminderError> {
        let conn = self.open()?;
        let tomorrow = date.succ_opt().unwrap_or(date);
        let (start, end) = local_day_bounds(date, zone);
        self.select(
            &conn,
            "WHERE scheduled_date = ?1 OR (sent_at >= ?2 AND sent_at < ?3) ORDER BY id",
            params![
                format_date(tomorrow),
                format_datetime(start),
                format_datetime(end)
            ],
        )
    }

    pub fn query_by_status(
        &self,
        status: MessageStatus,
    ) -> Result<Vec<ScheduledMessage>, ReminderError> {
        let conn = self.open()?;
        self.select(
            &conn,
            "WHERE status = ?1 ORDER BY id",
            params![status.as_str()],
        )
    }

    /// Marks a SCHEDULED, unclaimed row as owned by `token`. Only the winner
    /// may call the gateway for it.
    pub fn claim(&self, id: i64, token: &str, at: DateTime<Utc>) -> Result<bool, ReminderError> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE scheduled_messages
             SET claim_token = ?1, claimed_at = ?2
             WHERE id = ?3 AND status = ?4 AND claim_token IS NULL",
            params![
                token,
                format_datetime(at),
                id,
                MessageStatus::Scheduled.as_str()
            ],
        )?;
        tx.commit()?;
        Ok(updated == 1)
    }

    /// Moves a SCHEDULED row to a terminal status, recording `sent_at` as the
    /// completion time. Never overwrites a terminal row.
    pub fn update_status(
        &self,
        id: i64,
        status: MessageStatus,
        sent_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, ReminderError> {
        if !MessageStatus::Scheduled.can_transition_to(status) {
            return Err(ReminderError::InvalidTransition {
                from: MessageStatus::Scheduled,
                to: status,
            });
        }
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE scheduled_messages
             SET status = ?1, sent_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                status.as_str(),
                format_datetime(sent_at),
                id,
                MessageStatus::Scheduled.as_str()
            ],
        )?;
        if updated == 1 {
            tx.commit()?;
            return Ok(TransitionOutcome::Applied);
        }
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM scheduled_messages WHERE id = ?1",
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

    fn select<P: rusqlite::Params>(
        &self,
        conn: &Connection,
        clause: &str,
        params: P,
    ) -> Result<Vec<ScheduledMessage>, ReminderError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scheduled_messages {}",
            MESSAGE_COLUMNS, clause
        ))?;
        let rows = stmt.query_map(params, MessageRow::from_row)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.into_message()?);
        }
        Ok(messages)
    }

    pub(super) fn open(&self) -> Result<Connection, ReminderError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(REMINDER_SCHEMA)?;
        ensure_scheduled_message_columns(&conn)?;
        ensure_message_log_columns(&conn)?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Africa::Nairobi;
    use tempfile::TempDir;

    fn store() -> (TempDir, SqliteMessageStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = SqliteMessageStore::new(temp.path().join("state/scheduled_messages.db"))
            .expect("store");
        (temp, store)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_message(patient_ref: &str, scheduled_date: NaiveDate) -> NewScheduledMessage {
        NewScheduledMessage {
            patient_ref: patient_ref.to_string(),
            phone_number: "+254700000001".to_string(),
            message_body: format!("reminder for {}", patient_ref),
            scheduled_date,
            created_at: Utc.with_ymd_and_hms(2025, 3, 9, 14, 10, 0).unwrap(),
        }
    }

    #[test]
    fn insert_then_query_due_round_trips() {
        let (_temp, store) = store();
        let today = date(2025, 3, 10);
        let inserted = store
            .insert(&new_message("p-1", today))
            .unwrap()
            .expect("inserted");

        let due = store.query_due(today).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0], inserted);
        assert_eq!(due[0].status, MessageStatus::Scheduled);
        assert_eq!(due[0].sent_at, None);
        assert!(store.query_due(date(2025, 3, 11)).unwrap().is_empty());
    }

    #[test]
    fn duplicate_patient_date_is_skipped() {
        let (_temp, store) = store();
        let day = date(2025, 3, 10);
        assert!(store.insert(&new_message("p-1", day)).unwrap().is_some());
        assert!(store.insert(&new_message("p-1", day)).unwrap().is_none());
        assert!(store
            .insert(&new_message("p-1", date(2025, 3, 11)))
            .unwrap()
            .is_some());
        assert_eq!(store.query_by_status(MessageStatus::Scheduled).unwrap().len(), 2);
    }

    #[test]
    fn update_status_applies_once() {
        let (_temp, store) = store();
        let message = store
            .insert(&new_message("p-1", date(2025, 3, 10)))
            .unwrap()
            .expect("inserted");
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();

        assert_eq!(
            store.update_status(message.id, MessageStatus::Sent, at).unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(
            store
                .update_status(message.id, MessageStatus::Failed, at)
                .unwrap(),
            TransitionOutcome::AlreadyFinal(MessageStatus::Sent)
        );
        assert_eq!(
            store.update_status(999, MessageStatus::Sent, at).unwrap(),
            TransitionOutcome::NotFound
        );

        let stored = store.get(message.id).unwrap().expect("row");
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.sent_at, Some(at));
        assert!(store.query_due(date(2025, 3, 10)).unwrap().is_empty());
    }

    #[test]
    fn update_status_rejects_move_back_to_scheduled() {
        let (_temp, store) = store();
        let err = store
            .update_status(1, MessageStatus::Scheduled, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ReminderError::InvalidTransition { .. }));
    }

    #[test]
    fn claim_is_exclusive() {
        let (_temp, store) = store();
        let message = store
            .insert(&new_message("p-1", date(2025, 3, 10)))
            .unwrap()
            .expect("inserted");
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();

        assert!(store.claim(message.id, "run-a", at).unwrap());
        assert!(!store.claim(message.id, "run-b", at).unwrap());
        assert!(!store.claim(999, "run-a", at).unwrap());
    }

    #[test]
    fn query_window_covers_tomorrow_and_sent_today() {
        let (_temp, store) = store();
        let today = date(2025, 3, 10);
        let tomorrow_row = store
            .insert(&new_message("p-tomorrow", date(2025, 3, 11)))
            .unwrap()
            .expect("tomorrow");
        let sent_today = store
            .insert(&new_message("p-today", today))
            .unwrap()
            .expect("today");
        let sent_yesterday = store
            .insert(&new_message("p-yesterday", date(2025, 3, 9)))
            .unwrap()
            .expect("yesterday");

        // 22:00 UTC on the 9th is already the 10th in Nairobi.
        store
            .update_status(
                sent_today.id,
                MessageStatus::Sent,
                Utc.with_ymd_and_hms(2025, 3, 9, 22, 0, 0).unwrap(),
            )
            .unwrap();
        store
            .update_status(
                sent_yesterday.id,
                MessageStatus::Failed,
                Utc.with_ymd_and_hms(2025, 3, 9, 20, 0, 0).unwrap(),
            )
            .unwrap();

        let ids: Vec<i64> = store
            .query_window(today, Nairobi)
            .unwrap()
            .into_iter()
            .map(|message| message.id)
            .collect();
        assert_eq!(ids, vec![tomorrow_row.id, sent_today.id]);
    }

    fn legacy_database(path: &Path, rows: &[(&str, &str)]) {
        fs::create_dir_all(path.parent().expect("parent")).expect("state dir");
        let conn = Connection::open(path).expect("open legacy db");
        conn.execute_batch(
            "CREATE TABLE scheduled_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_ref TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                message_body TEXT NOT NULL,
                scheduled_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'SCHEDULED',
                sent_at TEXT
            );",
        )
        .expect("legacy schema");
        for (patient_ref, scheduled_date) in rows {
            conn.execute(
                "INSERT INTO scheduled_messages (patient_ref, phone_number, message_body, scheduled_date)
                 VALUES (?1, '+254700000001', 'legacy reminder', ?2)",
                params![patient_ref, scheduled_date],
            )
            .expect("legacy row");
        }
    }

    #[test]
    fn database_without_created_at_stays_readable() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("state/scheduled_messages.db");
        legacy_database(&path, &[("p-1", "2025-03-10")]);

        let store = SqliteMessageStore::new(path).expect("migrated store");
        let due = store.query_due(date(2025, 3, 10)).expect("query due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].patient_ref, "p-1");
        assert_eq!(due[0].message_body, "legacy reminder");

        let at = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();
        assert!(store.claim(due[0].id, "run-a", at).unwrap());
        assert_eq!(
            store.update_status(due[0].id, MessageStatus::Sent, at).unwrap(),
            TransitionOutcome::Applied
        );
        assert_eq!(store.query_by_status(MessageStatus::Sent).unwrap().len(), 1);
    }

    #[test]
    fn legacy_duplicates_keep_store_usable_without_unique_index() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("state/scheduled_messages.db");
        legacy_database(&path, &[("p-1", "2025-03-10"), ("p-1", "2025-03-10")]);

        let store = SqliteMessageStore::new(path.clone()).expect("store");
        let conn = Connection::open(&path).expect("open");
        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'index' AND name = 'idx_scheduled_messages_patient_date'",
                [],
                |row| row.get(0),
            )
            .expect("index lookup");
        assert_eq!(index_count, 0);

        assert_eq!(store.query_due(date(2025, 3, 10)).unwrap().len(), 2);
        assert!(store
            .insert(&new_message("p-1", date(2025, 3, 10)))
            .unwrap()
            .is_none());
        assert!(store
            .insert(&new_message("p-2", date(2025, 3, 10)))
            .unwrap()
            .is_some());
    }
}
