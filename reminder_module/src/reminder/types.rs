use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::directory::DirectoryError;

/// Lifecycle of a scheduled reminder. Only `Scheduled` may move, and only forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Scheduled,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Scheduled => "SCHEDULED",
            MessageStatus::Sent => "SENT",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Scheduled)
    }

    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Scheduled, MessageStatus::Sent)
                | (MessageStatus::Scheduled, MessageStatus::Failed)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = ReminderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(MessageStatus::Scheduled),
            "SENT" => Ok(MessageStatus::Sent),
            "FAILED" => Ok(MessageStatus::Failed),
            other => Err(ReminderError::Storage(format!(
                "unknown message status {}",
                other
            ))),
        }
    }
}

/// A persisted reminder. Phone number and body are snapshots taken when the
/// reminder was scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: i64,
    pub patient_ref: String,
    pub phone_number: String,
    pub message_body: String,
    pub scheduled_date: NaiveDate,
    pub status: MessageStatus,
    /// Completion time of the dispatch attempt, set for both SENT and FAILED.
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScheduledMessage {
    pub patient_ref: String,
    pub phone_number: String,
    pub message_body: String,
    pub scheduled_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Result of a conditional status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome<S = MessageStatus> {
    Applied,
    AlreadyFinal(S),
    NotFound,
}

/// Status of an ad-hoc (manually triggered) message in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    NotSent,
    Sent,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::NotSent => "NOT_SENT",
            AuditStatus::Sent => "SENT",
            AuditStatus::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(self, next: AuditStatus) -> bool {
        matches!(
            (self, next),
            (AuditStatus::NotSent, AuditStatus::Sent) | (AuditStatus::NotSent, AuditStatus::Failed)
        )
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = ReminderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NOT_SENT" => Ok(AuditStatus::NotSent),
            "SENT" => Ok(AuditStatus::Sent),
            "FAILED" => Ok(AuditStatus::Failed),
            other => Err(ReminderError::Storage(format!(
                "unknown audit status {}",
                other
            ))),
        }
    }
}

/// Review metadata a clinician attaches to an ad-hoc message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNotes {
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub reason_edited: Option<String>,
    #[serde(default)]
    pub regenerated: bool,
    #[serde(default)]
    pub reason_regenerated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: i64,
    pub patient_ref: String,
    pub phone_number: String,
    pub message: String,
    pub status: AuditStatus,
    #[serde(flatten)]
    pub review: ReviewNotes,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Gateway success text or error message captured at completion.
    pub outcome_detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub patient_ref: String,
    pub phone_number: String,
    pub message: String,
    pub review: ReviewNotes,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulingReport {
    pub target_date: Option<NaiveDate>,
    pub patients_scanned: usize,
    pub scheduled: usize,
    pub skipped_no_appointment: usize,
    pub skipped_no_person: usize,
    pub skipped_no_contact: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
}

impl SchedulingReport {
    pub(crate) fn for_date(target_date: NaiveDate) -> Self {
        Self {
            target_date: Some(target_date),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub dispatch_date: Option<NaiveDate>,
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_claimed: usize,
    pub errors: usize,
}

impl DispatchReport {
    pub(crate) fn for_date(dispatch_date: NaiveDate) -> Self {
        Self {
            dispatch_date: Some(dispatch_date),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },
    #[error("cron parse error: {0}")]
    Cron(#[from] cron::error::Error),
    #[error("invalid cron expression (expected 6 fields, got {0})")]
    InvalidCron(usize),
    #[error("no next run available for cron expression")]
    NoNextRun,
    #[error("unknown time zone: {0}")]
    InvalidTimeZone(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ManualSendError {
    #[error("patient {0} not found")]
    PatientNotFound(String),
    #[error("no phone number on file for patient {0}")]
    NoContact(String),
    #[error("no scheduled appointment on {date} for patient {patient_ref}")]
    NoAppointment {
        patient_ref: String,
        date: NaiveDate,
    },
    #[error("message body is empty")]
    EmptyMessage,
    #[error(transparent)]
    Reminder(#[from] ReminderError),
}

impl From<DirectoryError> for ManualSendError {
    fn from(err: DirectoryError) -> Self {
        ManualSendError::Reminder(ReminderError::Directory(err))
    }
}

impl From<rusqlite::Error> for ManualSendError {
    fn from(err: rusqlite::Error) -> Self {
        ManualSendError::Reminder(ReminderError::Sqlite(err))
    }
}
