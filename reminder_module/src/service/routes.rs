use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task;
use tracing::error;

use crate::reminder::{
    AdhocMessage, DispatchReport, ManualSendError, MessageLogEntry, MessageStatus,
    ReminderError, ScheduledMessage, SchedulingReport,
};

use super::state::AppState;

const NEXT_APPOINTMENT_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/reminders/schedule", post(run_scheduling))
        .route("/api/reminders/dispatch", post(run_dispatch))
        .route("/api/reminders/send", post(send_reminder))
        .route("/api/scheduled-messages", get(scheduled_and_sent))
        .route("/api/scheduled-messages/due-tomorrow", get(due_tomorrow))
        .route("/api/scheduled-messages/status/:status", get(by_status))
        .route(
            "/api/patients/:patient_ref/next-appointment",
            get(next_appointment),
        )
        .route(
            "/api/patients/:patient_ref/messages",
            get(patient_messages).post(send_patient_message),
        )
        .route(
            "/api/patients/:patient_ref/messages/latest",
            get(latest_patient_message),
        )
        .with_state(state)
}

#[derive(Debug)]
pub(super) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ReminderError> for ApiError {
    fn from(err: ReminderError) -> Self {
        error!("reminder request failed: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<ManualSendError> for ApiError {
    fn from(err: ManualSendError) -> Self {
        match err {
            ManualSendError::PatientNotFound(_)
            | ManualSendError::NoContact(_)
            | ManualSendError::NoAppointment { .. } => Self::not_found(err.to_string()),
            ManualSendError::EmptyMessage => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            ManualSendError::Reminder(inner) => inner.into(),
        }
    }
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work).await.map_err(|err| {
        error!("blocking task failed: {}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn run_scheduling(
    State(state): State<AppState>,
) -> Result<Json<SchedulingReport>, ApiError> {
    let report = blocking(move || Ok(state.pipeline.schedule_reminders()?)).await?;
    Ok(Json(report))
}

async fn run_dispatch(State(state): State<AppState>) -> Result<Json<DispatchReport>, ApiError> {
    let report = blocking(move || Ok(state.pipeline.dispatch_due()?)).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct SendReminderRequest {
    patient_ref: String,
}

async fn send_reminder(
    State(state): State<AppState>,
    Json(request): Json<SendReminderRequest>,
) -> Result<Json<MessageLogEntry>, ApiError> {
    let entry =
        blocking(move || Ok(state.pipeline.send_reminder_now(request.patient_ref.trim())?))
            .await?;
    Ok(Json(entry))
}

async fn scheduled_and_sent(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduledMessage>>, ApiError> {
    let messages = blocking(move || Ok(state.pipeline.scheduled_and_sent()?)).await?;
    Ok(Json(messages))
}

async fn due_tomorrow(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduledMessage>>, ApiError> {
    let messages = blocking(move || Ok(state.pipeline.due_tomorrow()?)).await?;
    Ok(Json(messages))
}

async fn by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<ScheduledMessage>>, ApiError> {
    let status: MessageStatus = status
        .parse()
        .map_err(|err: ReminderError| ApiError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let messages = blocking(move || Ok(state.pipeline.messages_with_status(status)?)).await?;
    Ok(Json(messages))
}

#[derive(Debug, Serialize)]
struct NextAppointmentResponse {
    patient_ref: String,
    next_appointment: DateTime<Utc>,
    /// Wall-clock start in the clinic's zone.
    local_time: String,
}

async fn next_appointment(
    State(state): State<AppState>,
    Path(patient_ref): Path<String>,
) -> Result<Json<NextAppointmentResponse>, ApiError> {
    blocking(move || {
        let next = state
            .pipeline
            .next_appointment(&patient_ref)?
            .ok_or_else(|| {
                ApiError::not_found(format!("no upcoming appointment for {}", patient_ref))
            })?;
        Ok(Json(NextAppointmentResponse {
            local_time: next
                .with_timezone(&state.pipeline.zone())
                .format(NEXT_APPOINTMENT_FORMAT)
                .to_string(),
            next_appointment: next,
            patient_ref,
        }))
    })
    .await
}

async fn patient_messages(
    State(state): State<AppState>,
    Path(patient_ref): Path<String>,
) -> Result<Json<Vec<MessageLogEntry>>, ApiError> {
    let entries =
        blocking(move || Ok(state.pipeline.message_log().list_by_patient(&patient_ref)?))
            .await?;
    Ok(Json(entries))
}

async fn latest_patient_message(
    State(state): State<AppState>,
    Path(patient_ref): Path<String>,
) -> Result<Json<MessageLogEntry>, ApiError> {
    blocking(move || {
        state
            .pipeline
            .message_log()
            .latest_by_patient(&patient_ref)?
            .map(Json)
            .ok_or_else(|| ApiError::not_found(format!("no messages for {}", patient_ref)))
    })
    .await
}

async fn send_patient_message(
    State(state): State<AppState>,
    Path(patient_ref): Path<String>,
    Json(message): Json<AdhocMessage>,
) -> Result<Json<MessageLogEntry>, ApiError> {
    let entry =
        blocking(move || Ok(state.pipeline.send_adhoc_message(&patient_ref, message)?)).await?;
    Ok(Json(entry))
}
