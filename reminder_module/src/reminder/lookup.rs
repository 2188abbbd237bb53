use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use super::directory::{AppointmentStatus, DirectoryError, DirectorySession};
use super::utils::local_day_bounds;

/// Start times of the patient's `Scheduled` appointments falling on `date`
/// in `zone`, ascending. Empty when there are none.
pub fn find_appointment_times(
    session: &dyn DirectorySession,
    patient_ref: &str,
    date: NaiveDate,
    zone: Tz,
) -> Result<Vec<DateTime<Utc>>, DirectoryError> {
    let (start, end) = local_day_bounds(date, zone);
    let mut times: Vec<DateTime<Utc>> = session
        .appointments(patient_ref, start, Some(end))?
        .into_iter()
        .filter(|appointment| appointment.status == AppointmentStatus::Scheduled)
        .map(|appointment| appointment.start)
        .collect();
    times.sort();
    Ok(times)
}

/// Earliest `Scheduled` appointment starting at or after `now`.
pub fn next_appointment(
    session: &dyn DirectorySession,
    patient_ref: &str,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, DirectoryError> {
    Ok(session
        .appointments(patient_ref, now, None)?
        .into_iter()
        .filter(|appointment| appointment.status == AppointmentStatus::Scheduled)
        .map(|appointment| appointment.start)
        .min())
}
