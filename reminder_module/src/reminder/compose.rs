use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use super::clock::Clock;

const APPOINTMENT_TIME_FORMAT: &str = "%I:%M %p";
const REMINDER_DATE_FORMAT: &str = "%d-%b-%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn from_local_time(time: NaiveTime) -> Self {
        match time.hour() {
            0..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
        }
    }
}

/// Renders reminder text. Zone, clinic name and clock are owned by the
/// composer; every call formats locally.
#[derive(Clone)]
pub struct MessageComposer {
    zone: Tz,
    clinic_name: String,
    clock: Arc<dyn Clock>,
}

impl MessageComposer {
    pub fn new(zone: Tz, clinic_name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            zone,
            clinic_name: clinic_name.into(),
            clock,
        }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn clinic_name(&self) -> &str {
        &self.clinic_name
    }

    /// Salutation for the current wall-clock time in the composer's zone.
    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_local_time(self.clock.now().with_timezone(&self.zone).time())
    }

    /// `appointment_times` must not be empty; the scheduling job skips
    /// patients without appointments before composing.
    pub fn compose(
        &self,
        first_name: &str,
        last_name: &str,
        reference_date: NaiveDate,
        appointment_times: &[DateTime<Utc>],
    ) -> String {
        format!(
            "Good {}, {} {}, this is a reminder of your appointment(s) on {} at the following time(s): {}. Location: {}. Please be on time. Stay Healthy.",
            self.time_of_day().as_str(),
            first_name.trim(),
            last_name.trim(),
            format_reminder_date(reference_date),
            format_appointment_times(appointment_times, self.zone),
            self.clinic_name,
        )
    }
}

pub fn format_appointment_times(times: &[DateTime<Utc>], zone: Tz) -> String {
    times
        .iter()
        .map(|time| {
            time.with_timezone(&zone)
                .format(APPOINTMENT_TIME_FORMAT)
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_reminder_date(date: NaiveDate) -> String {
    date.format(REMINDER_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::clock::FixedClock;
    use chrono::TimeZone;
    use chrono_tz::Africa::Nairobi;

    const CLINIC: &str = "ST. Josephs Health Center";

    fn composer_at(utc: DateTime<Utc>) -> MessageComposer {
        MessageComposer::new(Nairobi, CLINIC, Arc::new(FixedClock::new(utc)))
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn salutation_boundaries_follow_local_hour() {
        // Nairobi is UTC+3 all year.
        assert_eq!(
            composer_at(utc(2025, 3, 9, 8, 59)).time_of_day(),
            TimeOfDay::Morning
        );
        assert_eq!(
            composer_at(utc(2025, 3, 9, 9, 0)).time_of_day(),
            TimeOfDay::Afternoon
        );
        assert_eq!(
            composer_at(utc(2025, 3, 9, 13, 59)).time_of_day(),
            TimeOfDay::Afternoon
        );
        assert_eq!(
            composer_at(utc(2025, 3, 9, 14, 0)).time_of_day(),
            TimeOfDay::Evening
        );
    }

    #[test]
    fn salutation_ignores_server_utc_hour() {
        // 22:30 UTC is 01:30 the next morning in Nairobi.
        assert_eq!(
            composer_at(utc(2025, 3, 9, 22, 30)).time_of_day(),
            TimeOfDay::Morning
        );
    }

    #[test]
    fn compose_renders_full_template() {
        let composer = composer_at(utc(2025, 3, 9, 14, 10));
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let message = composer.compose("Jane", "Doe", date, &[utc(2025, 3, 10, 12, 0)]);
        assert_eq!(
            message,
            "Good evening, Jane Doe, this is a reminder of your appointment(s) on 10-Mar-2025 at the following time(s): 03:00 PM. Location: ST. Josephs Health Center. Please be on time. Stay Healthy."
        );
    }

    #[test]
    fn compose_joins_multiple_times_in_given_order() {
        let composer = composer_at(utc(2025, 3, 9, 6, 0));
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let message = composer.compose(
            "John",
            "Otieno",
            date,
            &[utc(2025, 3, 10, 5, 30), utc(2025, 3, 10, 11, 15)],
        );
        assert!(message.starts_with("Good morning, John Otieno,"));
        assert!(message.contains("following time(s): 08:30 AM, 02:15 PM."));
    }

    #[test]
    fn compose_is_deterministic_under_frozen_clock() {
        let composer = composer_at(utc(2025, 3, 9, 10, 0));
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let times = [utc(2025, 3, 10, 9, 0)];
        let first = composer.compose("Jane", "Doe", date, &times);
        let second = composer.compose("Jane", "Doe", date, &times);
        assert_eq!(first, second);
        assert!(first.contains("12:00 PM"));
    }

    #[test]
    fn reminder_date_uses_short_month_name() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        assert_eq!(format_reminder_date(date), "01-Dec-2025");
    }
}
