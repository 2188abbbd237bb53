use std::sync::Arc;

use crate::reminder::ReminderPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReminderPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<ReminderPipeline>) -> Self {
        Self { pipeline }
    }
}
