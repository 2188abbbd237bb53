mod audit;
mod clock;
mod compose;
pub mod directory;
mod dispatch;
mod lookup;
mod pipeline;
mod schedule;
mod scheduling;
mod sender;
mod store;
mod types;
mod utils;

pub use audit::AdhocMessage;
pub use clock::{Clock, FixedClock, SystemClock};
pub use compose::{format_appointment_times, format_reminder_date, MessageComposer, TimeOfDay};
pub use lookup::{find_appointment_times, next_appointment};
pub use pipeline::{ReminderPipeline, ReminderSettings};
pub use schedule::{next_run_after, validate_cron_expression};
pub use sender::{GatewaySender, SmsSender};
pub use store::{MessageLogStore, SqliteMessageStore};
pub use types::{
    AuditStatus, DispatchReport, ManualSendError, MessageLogEntry, MessageStatus,
    NewLogEntry, NewScheduledMessage, ReminderError, ReviewNotes, ScheduledMessage,
    SchedulingReport, TransitionOutcome,
};
