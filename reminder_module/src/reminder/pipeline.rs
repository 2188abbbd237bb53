use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::error;

use super::clock::{local_today, Clock};
use super::compose::MessageComposer;
use super::directory::{Directory, ServiceCredentials, SessionGuard};
use super::lookup;
use super::sender::SmsSender;
use super::store::{MessageLogStore, SqliteMessageStore};
use super::types::{MessageStatus, ReminderError, ScheduledMessage};

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    pub zone: Tz,
    pub clinic_name: String,
    pub credentials: ServiceCredentials,
}

/// Wires the store, directory, composer and SMS sender together. The two
/// daily jobs and the manual sends are methods on this type; none of them
/// keeps state between runs.
pub struct ReminderPipeline {
    pub(super) store: SqliteMessageStore,
    pub(super) message_log: MessageLogStore,
    pub(super) directory: Arc<dyn Directory>,
    pub(super) sender: Arc<dyn SmsSender>,
    pub(super) composer: MessageComposer,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) credentials: ServiceCredentials,
}

impl ReminderPipeline {
    pub fn new(
        store: SqliteMessageStore,
        directory: Arc<dyn Directory>,
        sender: Arc<dyn SmsSender>,
        clock: Arc<dyn Clock>,
        settings: ReminderSettings,
    ) -> Self {
        let composer = MessageComposer::new(settings.zone, settings.clinic_name, clock.clone());
        Self {
            message_log: MessageLogStore::new(store.clone()),
            store,
            directory,
            sender,
            composer,
            clock,
            credentials: settings.credentials,
        }
    }

    pub fn store(&self) -> &SqliteMessageStore {
        &self.store
    }

    pub fn message_log(&self) -> &MessageLogStore {
        &self.message_log
    }

    pub fn composer(&self) -> &MessageComposer {
        &self.composer
    }

    pub fn zone(&self) -> Tz {
        self.composer.zone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        local_today(self.clock.as_ref(), self.zone())
    }

    pub fn tomorrow(&self) -> NaiveDate {
        self.today() + Duration::days(1)
    }

    pub fn due_today(&self) -> Result<Vec<ScheduledMessage>, ReminderError> {
        self.store.query_due(self.today())
    }

    pub fn due_tomorrow(&self) -> Result<Vec<ScheduledMessage>, ReminderError> {
        self.store.query_due(self.tomorrow())
    }

    /// Reminders for tomorrow plus everything completed today.
    pub fn scheduled_and_sent(&self) -> Result<Vec<ScheduledMessage>, ReminderError> {
        self.store.query_window(self.today(), self.zone())
    }

    pub fn messages_with_status(
        &self,
        status: MessageStatus,
    ) -> Result<Vec<ScheduledMessage>, ReminderError> {
        self.store.query_by_status(status)
    }

    pub fn next_appointment(
        &self,
        patient_ref: &str,
    ) -> Result<Option<DateTime<Utc>>, ReminderError> {
        let session = self.open_session()?;
        Ok(lookup::next_appointment(&*session, patient_ref, self.now())?)
    }

    pub(super) fn open_session(&self) -> Result<SessionGuard, ReminderError> {
        SessionGuard::open(self.directory.as_ref(), &self.credentials).map_err(|err| {
            error!(
                "failed to open directory session as {}: {}",
                self.credentials.username, err
            );
            ReminderError::Directory(err)
        })
    }
}
