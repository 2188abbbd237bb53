pub mod reminder;
pub mod service;

pub use reminder::{
    DispatchReport, MessageStatus, ReminderError, ReminderPipeline, ScheduledMessage,
    SchedulingReport,
};
