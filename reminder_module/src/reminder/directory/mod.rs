use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

mod schema;
mod sqlite;

pub use schema::PHONE_NUMBER_ATTRIBUTE_TYPE;
pub use sqlite::SqliteDirectory;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),
    #[error("directory session already closed")]
    SessionClosed,
}

/// Credentials of the automation principal the batch jobs run as.
#[derive(Clone)]
pub struct ServiceCredentials {
    pub username: String,
    pub password: String,
}

impl ServiceCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonName {
    pub given_name: String,
    pub family_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    Completed,
    Cancelled,
    Missed,
    Other(String),
}

impl AppointmentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => AppointmentStatus::Scheduled,
            "checkedin" | "checked_in" => AppointmentStatus::CheckedIn,
            "completed" => AppointmentStatus::Completed,
            "cancelled" | "canceled" => AppointmentStatus::Cancelled,
            "missed" => AppointmentStatus::Missed,
            _ => AppointmentStatus::Other(raw.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub start: DateTime<Utc>,
    pub status: AppointmentStatus,
}

/// The external patient/person directory.
pub trait Directory: Send + Sync {
    fn open_session(
        &self,
        credentials: &ServiceCredentials,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// An authenticated directory session. Lookups are read-only.
pub trait DirectorySession {
    fn principal(&self) -> &str;
    /// Patient refs in directory order.
    fn all_patients(&self) -> Result<Vec<String>, DirectoryError>;
    fn person_name(&self, patient_ref: &str) -> Result<Option<PersonName>, DirectoryError>;
    fn contact_number(&self, patient_ref: &str) -> Result<Option<String>, DirectoryError>;
    /// Appointments of any status starting in `[from, to)`, or from `from`
    /// onwards when `to` is `None`.
    fn appointments(
        &self,
        patient_ref: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Appointment>, DirectoryError>;
    fn close(&mut self);
}

/// Scoped directory session: closed when the guard drops, on every exit path.
pub struct SessionGuard {
    session: Box<dyn DirectorySession>,
}

impl SessionGuard {
    pub fn open(
        directory: &dyn Directory,
        credentials: &ServiceCredentials,
    ) -> Result<Self, DirectoryError> {
        let session = directory.open_session(credentials)?;
        info!("directory session opened for {}", session.principal());
        Ok(Self { session })
    }
}

impl Deref for SessionGuard {
    type Target = dyn DirectorySession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let principal = self.session.principal().to_string();
        self.session.close();
        info!("directory session closed for {}", principal);
    }
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
