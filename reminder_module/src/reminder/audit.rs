use serde::Deserialize;
use tracing::{info, warn};

use super::lookup::find_appointment_times;
use super::pipeline::ReminderPipeline;
use super::types::{
    ManualSendError, MessageLogEntry, NewLogEntry, ReminderError, ReviewNotes, TransitionOutcome,
};
use super::utils::normalize_optional;

/// A caller-written message. The phone number falls back to the directory
/// when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdhocMessage {
    pub message: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(flatten)]
    pub review: ReviewNotes,
}

impl ReminderPipeline {
    /// Composes tomorrow's reminder for one patient and sends it right away,
    /// recording the attempt in the message log instead of the schedule.
    pub fn send_reminder_now(&self, patient_ref: &str) -> Result<MessageLogEntry, ManualSendError> {
        let session = self.open_session()?;
        let target_date = self.tomorrow();

        let name = session
            .person_name(patient_ref)?
            .ok_or_else(|| ManualSendError::PatientNotFound(patient_ref.to_string()))?;
        let phone_number = normalize_optional(session.contact_number(patient_ref)?)
            .ok_or_else(|| ManualSendError::NoContact(patient_ref.to_string()))?;
        let times = find_appointment_times(&*session, patient_ref, target_date, self.zone())?;
        if times.is_empty() {
            return Err(ManualSendError::NoAppointment {
                patient_ref: patient_ref.to_string(),
                date: target_date,
            });
        }
        drop(session);

        let message =
            self.composer
                .compose(&name.given_name, &name.family_name, target_date, &times);
        self.deliver_audited(NewLogEntry {
            patient_ref: patient_ref.to_string(),
            phone_number,
            message,
            review: ReviewNotes::default(),
            created_at: self.now(),
        })
    }

    pub fn send_adhoc_message(
        &self,
        patient_ref: &str,
        adhoc: AdhocMessage,
    ) -> Result<MessageLogEntry, ManualSendError> {
        let message = adhoc.message.trim().to_string();
        if message.is_empty() {
            return Err(ManualSendError::EmptyMessage);
        }
        let phone_number = match normalize_optional(adhoc.phone_number) {
            Some(phone_number) => phone_number,
            None => {
                let session = self.open_session()?;
                if session.person_name(patient_ref)?.is_none() {
                    return Err(ManualSendError::PatientNotFound(patient_ref.to_string()));
                }
                normalize_optional(session.contact_number(patient_ref)?)
                    .ok_or_else(|| ManualSendError::NoContact(patient_ref.to_string()))?
            }
        };

        self.deliver_audited(NewLogEntry {
            patient_ref: patient_ref.to_string(),
            phone_number,
            message,
            review: adhoc.review,
            created_at: self.now(),
        })
    }

    /// Records the message as NOT_SENT, sends it, then settles the entry with
    /// the gateway's detail string.
    fn deliver_audited(&self, entry: NewLogEntry) -> Result<MessageLogEntry, ManualSendError> {
        let created = self.message_log.create(&entry)?;
        let delivery = self.sender.send(&created.phone_number, &created.message);
        if delivery.delivered {
            info!(
                "manual message {} sent to patient {}",
                created.id, created.patient_ref
            );
        } else {
            warn!(
                "manual message {} to patient {} failed: {}",
                created.id, created.patient_ref, delivery.detail
            );
        }

        let outcome = self.message_log.complete(
            created.id,
            delivery.delivered,
            &delivery.detail,
            self.now(),
        )?;
        if let TransitionOutcome::AlreadyFinal(current) = outcome {
            warn!("message log entry {} already {}", created.id, current);
        }

        self.message_log.get(created.id)?.ok_or_else(|| {
            ManualSendError::Reminder(ReminderError::Storage(format!(
                "message log entry {} missing after send",
                created.id
            )))
        })
    }
}
