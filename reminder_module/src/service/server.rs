use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use send_sms_module::SmsGatewayClient;
use tracing::info;

use crate::reminder::directory::SqliteDirectory;
use crate::reminder::{
    GatewaySender, ReminderPipeline, ReminderSettings, SqliteMessageStore, SystemClock,
};

use super::config::ServiceConfig;
use super::jobs::start_job_threads;
use super::routes::api_router;
use super::state::AppState;
use super::BoxError;

/// Production wiring: SQLite store and directory, HTTP gateway, wall clock.
pub fn build_pipeline(config: &ServiceConfig) -> Result<ReminderPipeline, BoxError> {
    let store = SqliteMessageStore::new(config.scheduled_messages_db_path.clone())?;
    let directory = SqliteDirectory::new(config.directory_db_path.clone())?;
    let sender = GatewaySender::new(SmsGatewayClient::new(config.sms_gateway.clone()));
    Ok(ReminderPipeline::new(
        store,
        Arc::new(directory),
        Arc::new(sender),
        Arc::new(SystemClock),
        ReminderSettings {
            zone: config.time_zone,
            clinic_name: config.clinic_name.clone(),
            credentials: config.service_account.clone(),
        },
    ))
}

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let pipeline = Arc::new(build_pipeline(&config)?);

    let mut job_control = if config.jobs_enabled {
        info!(
            "reminder jobs enabled: scheduling '{}', dispatch '{}' ({})",
            config.scheduling_cron, config.dispatch_cron, config.time_zone
        );
        Some(start_job_threads(pipeline.clone(), &config)?)
    } else {
        info!("reminder jobs disabled; manual triggers only");
        None
    };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("reminder service listening on {}", addr);

    let app = api_router(AppState::new(pipeline));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    if let Some(control) = job_control.as_mut() {
        control.stop_and_join();
    }
    serve_result?;
    Ok(())
}
