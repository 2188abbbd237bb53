use tracing::{error, info, warn};
use uuid::Uuid;

use super::pipeline::ReminderPipeline;
use super::types::{
    DispatchReport, MessageStatus, ReminderError, ScheduledMessage, TransitionOutcome,
};

enum DispatchOutcome {
    Sent,
    Failed,
    Claimed,
}

impl ReminderPipeline {
    /// Sends every reminder due today. Each row is claimed before the gateway
    /// is called, so overlapping runs never send the same reminder twice.
    pub fn dispatch_due(&self) -> Result<DispatchReport, ReminderError> {
        let _session = self.open_session()?;
        let today = self.today();
        let mut report = DispatchReport::for_date(today);

        let due = self.store.query_due(today)?;
        if due.is_empty() {
            info!("nothing to dispatch for {}", today);
            return Ok(report);
        }
        report.due = due.len();

        let run_token = Uuid::new_v4().to_string();
        info!(
            "dispatching {} reminders for {} (run {})",
            report.due, today, run_token
        );
        for message in &due {
            match self.dispatch_one(message, &run_token) {
                Ok(DispatchOutcome::Sent) => report.sent += 1,
                Ok(DispatchOutcome::Failed) => report.failed += 1,
                Ok(DispatchOutcome::Claimed) => report.skipped_claimed += 1,
                Err(err) => {
                    report.errors += 1;
                    error!("failed to dispatch reminder {}: {}", message.id, err);
                }
            }
        }

        info!(
            "dispatch for {} done: due={} sent={} failed={} claimed_elsewhere={} errors={}",
            today, report.due, report.sent, report.failed, report.skipped_claimed, report.errors
        );
        Ok(report)
    }

    fn dispatch_one(
        &self,
        message: &ScheduledMessage,
        run_token: &str,
    ) -> Result<DispatchOutcome, ReminderError> {
        if !self.store.claim(message.id, run_token, self.now())? {
            info!("reminder {} claimed by another dispatcher", message.id);
            return Ok(DispatchOutcome::Claimed);
        }

        let delivery = self.sender.send(&message.phone_number, &message.message_body);
        let status = if delivery.delivered {
            MessageStatus::Sent
        } else {
            warn!(
                "sms to patient {} for reminder {} failed: {}",
                message.patient_ref, message.id, delivery.detail
            );
            MessageStatus::Failed
        };

        match self.store.update_status(message.id, status, self.now())? {
            TransitionOutcome::Applied => {
                info!("reminder {} marked {}", message.id, status);
            }
            TransitionOutcome::AlreadyFinal(current) => {
                warn!(
                    "reminder {} already {} when recording {}",
                    message.id, current, status
                );
            }
            TransitionOutcome::NotFound => {
                warn!("reminder {} vanished before recording {}", message.id, status);
            }
        }
        Ok(if delivery.delivered {
            DispatchOutcome::Sent
        } else {
            DispatchOutcome::Failed
        })
    }
}
