use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{error, info};

use crate::reminder::{next_run_after, validate_cron_expression, ReminderError, ReminderPipeline};

use super::config::ServiceConfig;

pub struct JobControl {
    stop: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl JobControl {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Starts one cron-driven thread per daily job.
pub fn start_job_threads(
    pipeline: Arc<ReminderPipeline>,
    config: &ServiceConfig,
) -> Result<JobControl, ReminderError> {
    validate_cron_expression(&config.scheduling_cron)?;
    validate_cron_expression(&config.dispatch_cron)?;

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(2);

    {
        let pipeline = pipeline.clone();
        handles.push(spawn_cron_job(
            "reminder-scheduling",
            config.scheduling_cron.clone(),
            config.time_zone,
            config.job_poll_interval,
            stop.clone(),
            move || match pipeline.schedule_reminders() {
                Ok(report) => info!(
                    "scheduling job finished: {} scheduled for {:?}",
                    report.scheduled, report.target_date
                ),
                Err(err) => error!("scheduling job failed: {}", err),
            },
        ));
    }

    handles.push(spawn_cron_job(
        "reminder-dispatch",
        config.dispatch_cron.clone(),
        config.time_zone,
        config.job_poll_interval,
        stop.clone(),
        move || match pipeline.dispatch_due() {
            Ok(report) => info!(
                "dispatch job finished: {} sent, {} failed",
                report.sent, report.failed
            ),
            Err(err) => error!("dispatch job failed: {}", err),
        },
    ));

    Ok(JobControl { stop, handles })
}

pub(super) fn spawn_cron_job<F>(
    name: &'static str,
    expression: String,
    zone: Tz,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
    job: F,
) -> thread::JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    thread::spawn(move || {
        let mut next_run = match next_run_after(&expression, Utc::now(), zone) {
            Ok(next_run) => next_run,
            Err(err) => {
                error!("{} has no schedule ({}): {}", name, expression, err);
                return;
            }
        };
        info!("{} next run at {}", name, next_run);

        while !stop.load(Ordering::Relaxed) {
            let now = Utc::now();
            if now >= next_run {
                info!("{} starting", name);
                job();
                next_run = match next_run_after(&expression, Utc::now(), zone) {
                    Ok(next_run) => next_run,
                    Err(err) => {
                        error!("{} cannot compute next run: {}", name, err);
                        return;
                    }
                };
                info!("{} next run at {}", name, next_run);
                continue;
            }
            let remaining = (next_run - now).to_std().unwrap_or(Duration::ZERO);
            thread::sleep(remaining.min(poll_interval));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn cron_job_fires_until_stopped() {
        let stop = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_cron_job(
            "every-second",
            "* * * * * *".to_string(),
            chrono_tz::Africa::Nairobi,
            Duration::from_millis(20),
            stop.clone(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        let mut control = JobControl {
            stop,
            handles: vec![handle],
        };
        control.stop_and_join();

        let after_stop = runs.load(Ordering::SeqCst);
        assert!(after_stop >= 1);
        thread::sleep(Duration::from_millis(1100));
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn invalid_expression_ends_thread() {
        let handle = spawn_cron_job(
            "broken",
            "not a cron".to_string(),
            chrono_tz::Africa::Nairobi,
            Duration::from_millis(20),
            Arc::new(AtomicBool::new(false)),
            || {},
        );
        assert!(handle.join().is_ok());
    }
}
