#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reminder_module::reminder::directory::{
    hash_secret, ServiceCredentials, SqliteDirectory, PHONE_NUMBER_ATTRIBUTE_TYPE,
};
use reminder_module::reminder::{
    FixedClock, ReminderPipeline, ReminderSettings, SmsSender, SqliteMessageStore,
};
use rusqlite::{params, Connection};

pub const SERVICE_USERNAME: &str = "reminders-bot";
pub const SERVICE_PASSWORD: &str = "s3cret";
pub const CLINIC_NAME: &str = "ST. Josephs Health Center";

pub fn start_mockito_server(test_name: &str) -> Option<mockito::ServerGuard> {
    let server = std::panic::catch_unwind(|| mockito::Server::new());
    match server {
        Ok(server) => Some(server),
        Err(_) => {
            eprintln!(
                "Skipping {test_name}; unable to start mockito server in this environment."
            );
            None
        }
    }
}

/// Writes rows straight into a directory replica, the way the clinic sync would.
pub struct DirectorySeed {
    conn: Connection,
}

impl DirectorySeed {
    pub fn open(directory: &SqliteDirectory) -> Self {
        let conn = Connection::open(directory.path()).expect("open directory db");
        Self { conn }
    }

    pub fn service_account(&self, username: &str, password: &str) -> &Self {
        self.conn
            .execute(
                "INSERT INTO service_account (username, password_sha256) VALUES (?1, ?2)",
                params![username, hash_secret(password)],
            )
            .expect("insert service account");
        self
    }

    pub fn patient(&self, uuid: &str, given: &str, family: &str, phone: Option<&str>) -> &Self {
        self.conn
            .execute(
                "INSERT INTO person (uuid, given_name, family_name) VALUES (?1, ?2, ?3)",
                params![uuid, given, family],
            )
            .expect("insert person");
        self.conn
            .execute("INSERT INTO patient (uuid) VALUES (?1)", params![uuid])
            .expect("insert patient");
        if let Some(phone) = phone {
            self.conn
                .execute(
                    "INSERT INTO person_attribute (person_uuid, attribute_type, value)
                     VALUES (?1, ?2, ?3)",
                    params![uuid, PHONE_NUMBER_ATTRIBUTE_TYPE, phone],
                )
                .expect("insert phone");
        }
        self
    }

    pub fn appointment(&self, uuid: &str, start: DateTime<Utc>, status: &str) -> &Self {
        self.conn
            .execute(
                "INSERT INTO patient_appointment (patient_uuid, start_date_time, status)
                 VALUES (?1, ?2, ?3)",
                params![uuid, start.to_rfc3339(), status],
            )
            .expect("insert appointment");
        self
    }
}

pub fn seeded_directory(root: &Path) -> SqliteDirectory {
    let directory = SqliteDirectory::new(root.join("directory.db")).expect("directory");
    DirectorySeed::open(&directory).service_account(SERVICE_USERNAME, SERVICE_PASSWORD);
    directory
}

pub fn pipeline_with(
    root: &Path,
    directory: SqliteDirectory,
    sender: Arc<dyn SmsSender>,
    clock: FixedClock,
) -> ReminderPipeline {
    let store = SqliteMessageStore::new(root.join("state").join("scheduled_messages.db"))
        .expect("store");
    ReminderPipeline::new(
        store,
        Arc::new(directory),
        sender,
        Arc::new(clock),
        ReminderSettings {
            zone: chrono_tz::Africa::Nairobi,
            clinic_name: CLINIC_NAME.to_string(),
            credentials: ServiceCredentials::new(SERVICE_USERNAME, SERVICE_PASSWORD),
        },
    )
}
