use chrono::NaiveDate;
use tracing::{info, warn};

use super::directory::DirectorySession;
use super::lookup::find_appointment_times;
use super::pipeline::ReminderPipeline;
use super::types::{NewScheduledMessage, ReminderError, SchedulingReport};
use super::utils::normalize_optional;

enum PatientOutcome {
    Scheduled(i64),
    NoAppointment,
    NoPerson,
    NoContact,
    Duplicate,
}

impl ReminderPipeline {
    /// Scans every patient for appointments tomorrow and records one
    /// SCHEDULED reminder each. A failing patient is logged and counted; only
    /// a directory session failure aborts the run.
    pub fn schedule_reminders(&self) -> Result<SchedulingReport, ReminderError> {
        let session = self.open_session()?;
        let target_date = self.tomorrow();
        let mut report = SchedulingReport::for_date(target_date);
        info!("scheduling reminders for appointments on {}", target_date);

        let patients = session.all_patients()?;
        for patient_ref in &patients {
            report.patients_scanned += 1;
            match self.schedule_patient(&*session, patient_ref, target_date) {
                Ok(PatientOutcome::Scheduled(id)) => {
                    report.scheduled += 1;
                    info!("scheduled reminder {} for patient {}", id, patient_ref);
                }
                Ok(PatientOutcome::NoAppointment) => {
                    report.skipped_no_appointment += 1;
                    info!(
                        "no appointments on {} for patient {}",
                        target_date, patient_ref
                    );
                }
                Ok(PatientOutcome::NoPerson) => {
                    report.skipped_no_person += 1;
                    info!("no person record for patient {}", patient_ref);
                }
                Ok(PatientOutcome::NoContact) => {
                    report.skipped_no_contact += 1;
                    info!("no phone number for patient {}", patient_ref);
                }
                Ok(PatientOutcome::Duplicate) => {
                    report.skipped_duplicate += 1;
                    info!(
                        "reminder for patient {} on {} already scheduled",
                        patient_ref, target_date
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    warn!("failed to schedule reminder for patient {}: {}", patient_ref, err);
                }
            }
        }

        info!(
            "scheduling for {} done: scanned={} scheduled={} no_appointment={} no_person={} no_contact={} duplicate={} failed={}",
            target_date,
            report.patients_scanned,
            report.scheduled,
            report.skipped_no_appointment,
            report.skipped_no_person,
            report.skipped_no_contact,
            report.skipped_duplicate,
            report.failed
        );
        Ok(report)
    }

    fn schedule_patient(
        &self,
        session: &dyn DirectorySession,
        patient_ref: &str,
        target_date: NaiveDate,
    ) -> Result<PatientOutcome, ReminderError> {
        let times = find_appointment_times(session, patient_ref, target_date, self.zone())?;
        if times.is_empty() {
            return Ok(PatientOutcome::NoAppointment);
        }
        let Some(name) = session.person_name(patient_ref)? else {
            return Ok(PatientOutcome::NoPerson);
        };
        let Some(phone_number) = normalize_optional(session.contact_number(patient_ref)?) else {
            return Ok(PatientOutcome::NoContact);
        };

        let message_body =
            self.composer
                .compose(&name.given_name, &name.family_name, target_date, &times);
        let inserted = self.store.insert(&NewScheduledMessage {
            patient_ref: patient_ref.to_string(),
            phone_number,
            message_body,
            scheduled_date: target_date,
            created_at: self.now(),
        })?;
        Ok(match inserted {
            Some(message) => PatientOutcome::Scheduled(message.id),
            None => PatientOutcome::Duplicate,
        })
    }
}
