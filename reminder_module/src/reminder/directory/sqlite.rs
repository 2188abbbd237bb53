use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use super::schema::{DIRECTORY_SCHEMA, PHONE_NUMBER_ATTRIBUTE_TYPE};
use super::{
    hash_secret, Appointment, AppointmentStatus, Directory, DirectoryError, DirectorySession,
    PersonName, ServiceCredentials,
};

/// Directory backed by a local SQLite replica of the clinic's patient records.
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    path: PathBuf,
}

impl SqliteDirectory {
    pub fn new(path: PathBuf) -> Result<Self, DirectoryError> {
        let directory = Self { path };
        directory.ensure_schema()?;
        Ok(directory)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_schema(&self) -> Result<(), DirectoryError> {
        let _ = self.open()?;
        Ok(())
    }

    fn open(&self) -> Result<Connection, DirectoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(DIRECTORY_SCHEMA)?;
        Ok(conn)
    }
}

impl Directory for SqliteDirectory {
    fn open_session(
        &self,
        credentials: &ServiceCredentials,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let conn = self.open()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT password_sha256 FROM service_account
                 WHERE username = ?1 AND retired = 0",
                params![credentials.username],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(hash) if hash.eq_ignore_ascii_case(&hash_secret(&credentials.password)) => {
                Ok(Box::new(SqliteDirectorySession {
                    conn: Some(conn),
                    principal: credentials.username.clone(),
                }))
            }
            _ => Err(DirectoryError::AuthenticationFailed(
                credentials.username.clone(),
            )),
        }
    }
}

struct SqliteDirectorySession {
    conn: Option<Connection>,
    principal: String,
}

impl SqliteDirectorySession {
    fn conn(&self) -> Result<&Connection, DirectoryError> {
        self.conn.as_ref().ok_or(DirectoryError::SessionClosed)
    }
}

impl DirectorySession for SqliteDirectorySession {
    fn principal(&self) -> &str {
        &self.principal
    }

    fn all_patients(&self) -> Result<Vec<String>, DirectoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT patient.uuid FROM patient
             JOIN person ON person.uuid = patient.uuid
             WHERE patient.voided = 0 AND person.voided = 0
             ORDER BY patient.rowid",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?);
        }
        Ok(patients)
    }

    fn person_name(&self, patient_ref: &str) -> Result<Option<PersonName>, DirectoryError> {
        let conn = self.conn()?;
        let name = conn
            .query_row(
                "SELECT given_name, family_name FROM person
                 WHERE uuid = ?1 AND voided = 0",
                params![patient_ref],
                |row| {
                    Ok(PersonName {
                        given_name: row.get(0)?,
                        family_name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(name)
    }

    fn contact_number(&self, patient_ref: &str) -> Result<Option<String>, DirectoryError> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM person_attribute
                 WHERE person_uuid = ?1 AND attribute_type = ?2 AND voided = 0
                 ORDER BY id DESC
                 LIMIT 1",
                params![patient_ref, PHONE_NUMBER_ATTRIBUTE_TYPE],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value
            .map(|raw| raw.trim().to_string())
            .filter(|trimmed| !trimmed.is_empty()))
    }

    fn appointments(
        &self,
        patient_ref: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Appointment>, DirectoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, start_date_time, status FROM patient_appointment
             WHERE patient_uuid = ?1",
        )?;
        let rows = stmt.query_map(params![patient_ref], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut appointments = Vec::new();
        for row in rows {
            let (id, start_raw, status_raw) = row?;
            let start = match DateTime::parse_from_rfc3339(start_raw.trim()) {
                Ok(value) => value.with_timezone(&Utc),
                Err(err) => {
                    warn!(
                        "skipping appointment {} for {} with unreadable start {}: {}",
                        id, patient_ref, start_raw, err
                    );
                    continue;
                }
            };
            if start < from || to.map_or(false, |end| start >= end) {
                continue;
            }
            appointments.push(Appointment {
                start,
                status: AppointmentStatus::parse(&status_raw),
            });
        }
        appointments.sort_by_key(|appointment| appointment.start);
        Ok(appointments)
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                warn!("failed to close directory connection: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn seeded_directory() -> (TempDir, SqliteDirectory) {
        let temp = TempDir::new().expect("tempdir");
        let directory = SqliteDirectory::new(temp.path().join("directory.db")).expect("directory");
        let conn = Connection::open(directory.path()).expect("open");
        conn.execute_batch(&format!(
            "INSERT INTO service_account (username, password_sha256) VALUES ('reminders-bot', '{}');
             INSERT INTO person (uuid, given_name, family_name) VALUES ('p-1', 'Jane', 'Doe');
             INSERT INTO patient (uuid) VALUES ('p-1');
             INSERT INTO person_attribute (person_uuid, attribute_type, value, voided)
                 VALUES ('p-1', '{phone}', '+254700000001', 1);
             INSERT INTO person_attribute (person_uuid, attribute_type, value)
                 VALUES ('p-1', '{phone}', ' +254700000002 ');
             INSERT INTO patient_appointment (patient_uuid, start_date_time, status)
                 VALUES ('p-1', '2025-03-10T12:00:00Z', 'Scheduled');
             INSERT INTO patient_appointment (patient_uuid, start_date_time, status)
                 VALUES ('p-1', '2025-03-10T06:00:00Z', 'Cancelled');
             INSERT INTO patient_appointment (patient_uuid, start_date_time, status)
                 VALUES ('p-1', 'not-a-date', 'Scheduled');",
            hash_secret("secret"),
            phone = PHONE_NUMBER_ATTRIBUTE_TYPE,
        ))
        .expect("seed");
        (temp, directory)
    }

    #[test]
    fn rejects_wrong_password() {
        let (_temp, directory) = seeded_directory();
        let err = directory
            .open_session(&ServiceCredentials::new("reminders-bot", "nope"))
            .err()
            .expect("auth failure");
        assert!(matches!(err, DirectoryError::AuthenticationFailed(_)));
    }

    #[test]
    fn session_reads_patient_records() {
        let (_temp, directory) = seeded_directory();
        let session = directory
            .open_session(&ServiceCredentials::new("reminders-bot", "secret"))
            .expect("session");
        assert_eq!(session.all_patients().unwrap(), vec!["p-1".to_string()]);
        assert_eq!(
            session.person_name("p-1").unwrap(),
            Some(PersonName {
                given_name: "Jane".to_string(),
                family_name: "Doe".to_string(),
            })
        );
        assert_eq!(
            session.contact_number("p-1").unwrap(),
            Some("+254700000002".to_string())
        );
        assert_eq!(session.person_name("missing").unwrap(), None);
    }

    #[test]
    fn appointments_are_filtered_by_range_and_sorted() {
        let (_temp, directory) = seeded_directory();
        let session = directory
            .open_session(&ServiceCredentials::new("reminders-bot", "secret"))
            .expect("session");
        let from = Utc.with_ymd_and_hms(2025, 3, 9, 21, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 3, 10, 21, 0, 0).unwrap();
        let appointments = session.appointments("p-1", from, Some(to)).unwrap();
        assert_eq!(appointments.len(), 2);
        assert_eq!(appointments[0].status, AppointmentStatus::Cancelled);
        assert_eq!(appointments[1].status, AppointmentStatus::Scheduled);

        let later = Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap();
        assert_eq!(session.appointments("p-1", later, None).unwrap().len(), 1);
    }

    #[test]
    fn closed_session_refuses_lookups() {
        let (_temp, directory) = seeded_directory();
        let mut session = directory
            .open_session(&ServiceCredentials::new("reminders-bot", "secret"))
            .expect("session");
        session.close();
        assert!(matches!(
            session.all_patients(),
            Err(DirectoryError::SessionClosed)
        ));
    }
}
