/// Person attribute type holding the patient's primary phone number.
pub const PHONE_NUMBER_ATTRIBUTE_TYPE: &str = "14d4f066-15f5-102d-96e4-000c29c2a5d7";

pub(super) const DIRECTORY_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS person (
    uuid TEXT PRIMARY KEY,
    given_name TEXT NOT NULL,
    family_name TEXT NOT NULL,
    voided INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS patient (
    uuid TEXT PRIMARY KEY REFERENCES person(uuid) ON DELETE CASCADE,
    voided INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS person_attribute (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_uuid TEXT NOT NULL REFERENCES person(uuid) ON DELETE CASCADE,
    attribute_type TEXT NOT NULL,
    value TEXT NOT NULL,
    voided INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS patient_appointment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_uuid TEXT NOT NULL REFERENCES patient(uuid) ON DELETE CASCADE,
    start_date_time TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS service_account (
    username TEXT PRIMARY KEY,
    password_sha256 TEXT NOT NULL,
    retired INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_patient_appointment_patient
    ON patient_appointment (patient_uuid, start_date_time);
"#;
