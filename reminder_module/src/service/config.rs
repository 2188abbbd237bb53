use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use send_sms_module::SmsGatewayConfig;

use crate::reminder::directory::ServiceCredentials;
use crate::reminder::{validate_cron_expression, ReminderError};

use super::BoxError;

pub const DEFAULT_TIME_ZONE: &str = "Africa/Nairobi";
pub const DEFAULT_CLINIC_NAME: &str = "ST. Josephs Health Center";
pub const DEFAULT_SCHEDULING_CRON: &str = "0 10 17 * * *";
pub const DEFAULT_DISPATCH_CRON: &str = "0 30 17 * * *";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub scheduled_messages_db_path: PathBuf,
    pub directory_db_path: PathBuf,
    /// Zone for "today", "tomorrow", salutations and cron evaluation.
    pub time_zone: Tz,
    pub clinic_name: String,
    pub scheduling_cron: String,
    pub dispatch_cron: String,
    pub jobs_enabled: bool,
    pub job_poll_interval: Duration,
    pub service_account: ServiceCredentials,
    pub sms_gateway: SmsGatewayConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("REMINDER_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("REMINDER_SERVICE_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(9200);

        let runtime_root = default_runtime_root()?;
        let scheduled_messages_db_path =
            resolve_path(env::var("SCHEDULED_MESSAGES_DB_PATH").unwrap_or_else(|_| {
                runtime_root
                    .join("state")
                    .join("scheduled_messages.db")
                    .to_string_lossy()
                    .into_owned()
            }))?;
        let directory_db_path = resolve_path(env::var("DIRECTORY_DB_PATH").unwrap_or_else(|_| {
            runtime_root
                .join("state")
                .join("directory.db")
                .to_string_lossy()
                .into_owned()
        }))?;

        let zone_raw = env_var_non_empty("REMINDER_TIME_ZONE")
            .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());
        let time_zone = parse_time_zone(&zone_raw)?;
        let clinic_name = env_var_non_empty("CLINIC_NAME")
            .unwrap_or_else(|| DEFAULT_CLINIC_NAME.to_string());

        let scheduling_cron = env_var_non_empty("REMINDER_SCHEDULING_CRON")
            .unwrap_or_else(|| DEFAULT_SCHEDULING_CRON.to_string());
        validate_cron_expression(&scheduling_cron)?;
        let dispatch_cron = env_var_non_empty("REMINDER_DISPATCH_CRON")
            .unwrap_or_else(|| DEFAULT_DISPATCH_CRON.to_string());
        validate_cron_expression(&dispatch_cron)?;

        let jobs_enabled = env_flag("REMINDER_JOBS_ENABLED", true);
        let job_poll_interval = env::var("REMINDER_JOB_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(1));

        let username = env_var_non_empty("SERVICE_ACCOUNT_USERNAME")
            .ok_or_else(|| "SERVICE_ACCOUNT_USERNAME not set".to_string())?;
        let password = env::var("SERVICE_ACCOUNT_PASSWORD")
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| "SERVICE_ACCOUNT_PASSWORD not set".to_string())?;

        let sms_gateway = SmsGatewayConfig::from_env()?;

        Ok(Self {
            host,
            port,
            scheduled_messages_db_path,
            directory_db_path,
            time_zone,
            clinic_name,
            scheduling_cron,
            dispatch_cron,
            jobs_enabled,
            job_poll_interval,
            service_account: ServiceCredentials::new(username, password),
            sms_gateway,
        })
    }
}

pub(crate) fn parse_time_zone(raw: &str) -> Result<Tz, ReminderError> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| ReminderError::InvalidTimeZone(raw.trim().to_string()))
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        ),
        Err(_) => default,
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_runtime_root() -> Result<PathBuf, io::Error> {
    let home =
        env::var("HOME").map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".ehospital").join("reminders"))
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}
