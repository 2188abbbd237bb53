use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;

use super::types::ReminderError;

pub fn validate_cron_expression(expression: &str) -> Result<(), ReminderError> {
    let fields = expression.split_whitespace().count();
    if fields != 6 {
        return Err(ReminderError::InvalidCron(fields));
    }
    CronSchedule::from_str(expression)?;
    Ok(())
}

/// Next fire time strictly after `after`, with the expression read as local
/// wall-clock time in `zone`.
pub fn next_run_after(
    expression: &str,
    after: DateTime<Utc>,
    zone: Tz,
) -> Result<DateTime<Utc>, ReminderError> {
    validate_cron_expression(expression)?;
    let schedule = CronSchedule::from_str(expression)?;
    schedule
        .after(&after.with_timezone(&zone))
        .next()
        .map(|datetime| datetime.with_timezone(&Utc))
        .ok_or(ReminderError::NoNextRun)
}
