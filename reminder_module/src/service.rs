mod config;
mod jobs;
mod routes;
mod server;
mod state;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{
    ServiceConfig, DEFAULT_CLINIC_NAME, DEFAULT_DISPATCH_CRON, DEFAULT_SCHEDULING_CRON,
    DEFAULT_TIME_ZONE,
};
pub use jobs::{start_job_threads, JobControl};
pub use routes::api_router;
pub use server::{build_pipeline, run_server};
pub use state::AppState;
