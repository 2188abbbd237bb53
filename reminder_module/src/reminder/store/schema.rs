pub(super) const REMINDER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_ref TEXT NOT NULL,
    phone_number TEXT NOT NULL,
    message_body TEXT NOT NULL,
    scheduled_date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'SCHEDULED',
    sent_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scheduled_messages_due
    ON scheduled_messages (status, scheduled_date);

CREATE INDEX IF NOT EXISTS idx_scheduled_messages_sent_at
    ON scheduled_messages (sent_at);

CREATE TABLE IF NOT EXISTS message_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_ref TEXT NOT NULL,
    phone_number TEXT NOT NULL,
    message TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'NOT_SENT',
    edited INTEGER NOT NULL DEFAULT 0,
    reason_edited TEXT,
    regenerated INTEGER NOT NULL DEFAULT 0,
    reason_regenerated TEXT,
    created_at TEXT NOT NULL,
    sent_at TEXT,
    outcome_detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_message_log_patient
    ON message_log (patient_ref, id);
"#;
