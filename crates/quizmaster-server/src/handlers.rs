use std::time::Duration;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use quizmaster_core::{Actor, DataStore, NewScore, NewSubject, ReminderSlot, get_i64};
use quizmaster_jobs::JobQueue;
use quizmaster_jobs::types::{JobEnvelope, JobKind};

use crate::cache::CacheStore;
use crate::state::AppState;

// =============================================================================
// Error mapping
// =============================================================================

/// Handler-level error carried to the client.
///
/// Only business-logic failures surface here; cache and job failures are
/// absorbed by their layers.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<quizmaster_core::StoreError> for ApiError {
    fn from(err: quizmaster_core::StoreError) -> Self {
        match err {
            quizmaster_core::StoreError::Invalid(msg) => Self {
                status: StatusCode::BAD_REQUEST,
                message: msg,
            },
            quizmaster_core::StoreError::Unavailable(msg) => {
                tracing::error!(error = %msg, "Data store error");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "data store unavailable".into(),
                }
            }
        }
    }
}

impl From<quizmaster_jobs::JobError> for ApiError {
    fn from(err: quizmaster_jobs::JobError) -> Self {
        tracing::error!(error = %err, "Job queue error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "job queue unavailable".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

// =============================================================================
// Health and info
// =============================================================================

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "Quizmaster Server",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ready"})))
}

// =============================================================================
// Catalog
// =============================================================================

pub async fn list_subjects(State(state): State<AppState>) -> Result<Response, ApiError> {
    let subjects = state.store.list_subjects().await?;
    let chapters = state.store.list_chapters().await?;
    Ok(Json(json!({"subjects": subjects, "chapters": chapters})).into_response())
}

pub async fn create_subject(
    State(state): State<AppState>,
    Json(subject): Json<NewSubject>,
) -> Result<Response, ApiError> {
    let row = state.store.create_subject(subject).await?;
    Ok((StatusCode::CREATED, Json(Value::Object(row))).into_response())
}

pub async fn update_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<i64>,
    Json(subject): Json<NewSubject>,
) -> Result<Response, ApiError> {
    match state.store.update_subject(subject_id, subject).await? {
        Some(row) => Ok(Json(Value::Object(row)).into_response()),
        None => Err(ApiError::not_found(format!("subject {subject_id} not found"))),
    }
}

pub async fn delete_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<i64>,
) -> Result<Response, ApiError> {
    if state.store.delete_subject(subject_id).await? {
        Ok(Json(json!({"message": "subject deleted"})).into_response())
    } else {
        Err(ApiError::not_found(format!("subject {subject_id} not found")))
    }
}

pub async fn list_quizzes(State(state): State<AppState>) -> Result<Response, ApiError> {
    let quizzes = state.store.list_quizzes().await?;
    Ok(Json(json!({"quizzes": quizzes})).into_response())
}

// =============================================================================
// User summary and scores
// =============================================================================

/// Summary endpoint with a handler-level read-through cache.
///
/// Unlike the hashed response-cache keys, the summary lives under the stable
/// key `user_summary:{uid}` so the score route can invalidate it exactly.
pub async fn user_summary(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Response, ApiError> {
    let cache_key = format!("user_summary:{user_id}");

    match state.cache.get(&cache_key).await {
        Ok(Some(cached)) => {
            if let Ok(value) = serde_json::from_slice::<Value>(&cached) {
                tracing::debug!(key = %cache_key, "summary cache hit");
                return Ok(Json(value).into_response());
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(key = %cache_key, error = %e, "Cache lookup failed"),
    }

    let Some(summary) = state.store.user_summary(user_id).await? else {
        return Err(ApiError::not_found(format!("user {user_id} not found")));
    };

    let payload = Value::Object(summary);
    if let Ok(bytes) = serde_json::to_vec(&payload) {
        let ttl = Duration::from_secs(state.config.cache.default_ttl_secs);
        if let Err(e) = state.cache.set(&cache_key, bytes, ttl).await {
            tracing::warn!(key = %cache_key, error = %e, "Cache write failed");
        }
    }
    Ok(Json(payload).into_response())
}

pub async fn record_score(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(score): Json<NewScore>,
) -> Result<Response, ApiError> {
    if state.store.find_user(user_id).await?.is_none() {
        return Err(ApiError::not_found(format!("user {user_id} not found")));
    }
    let row = state.store.record_score(user_id, score).await?;
    Ok((StatusCode::CREATED, Json(Value::Object(row))).into_response())
}

// =============================================================================
// Reminder preferences
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ReminderPreferenceRequest {
    pub reminder_preference: String,
}

async fn resolve_user_id(state: &AppState, actor: &Actor) -> Result<i64, ApiError> {
    if actor.is_anonymous() {
        return Err(ApiError::unauthorized("authentication required"));
    }
    let user = state
        .store
        .find_user_by_username(actor.as_str())
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    get_i64(&user, "uid").ok_or_else(|| ApiError::not_found("user not found"))
}

pub async fn get_reminder_preference(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, ApiError> {
    let user_id = resolve_user_id(&state, &actor).await?;
    let preference = state
        .store
        .reminder_preference(user_id)
        .await?
        // Morning is the default for users who never chose.
        .unwrap_or(ReminderSlot::Morning);
    Ok(Json(json!({
        "user_id": user_id,
        "reminder_preference": preference.as_str(),
    }))
    .into_response())
}

pub async fn set_reminder_preference(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ReminderPreferenceRequest>,
) -> Result<Response, ApiError> {
    let user_id = resolve_user_id(&state, &actor).await?;
    let Some(slot) = ReminderSlot::parse(&request.reminder_preference) else {
        return Err(ApiError::bad_request(
            "reminder_preference must be 'morning', 'afternoon', or 'evening'",
        ));
    };
    state.store.set_reminder_preference(user_id, slot).await?;
    Ok(Json(json!({
        "message": "reminder preference updated",
        "user_id": user_id,
        "reminder_preference": slot.as_str(),
    }))
    .into_response())
}

pub async fn disable_reminders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, ApiError> {
    let user_id = resolve_user_id(&state, &actor).await?;
    let existed = state.store.clear_reminder_preference(user_id).await?;
    let message = if existed {
        "reminders disabled"
    } else {
        "no reminder preference to disable"
    };
    Ok(Json(json!({"message": message})).into_response())
}

// =============================================================================
// Administrative job trigger
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TriggerJobRequest {
    pub job_kind: JobKind,
    #[serde(default)]
    pub target_id: Option<i64>,
}

/// Enqueue a job immediately; does not block for execution.
pub async fn trigger_job(
    State(state): State<AppState>,
    Json(request): Json<TriggerJobRequest>,
) -> Result<Response, ApiError> {
    let envelope = match request.target_id {
        Some(target_id) => JobEnvelope::for_target(request.job_kind, target_id),
        None => JobEnvelope::new(request.job_kind),
    };
    let job_id = state.queue.enqueue(envelope).await?;
    tracing::info!(job_kind = %request.job_kind, job_id = %job_id, "Job triggered via admin endpoint");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"job_id": job_id, "status": "accepted"})),
    )
        .into_response())
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    match state.queue.get(job_id).await? {
        Some(job) => Ok(Json(job).into_response()),
        None => Err(ApiError::not_found(format!("job {job_id} not found"))),
    }
}

pub async fn job_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats).into_response())
}
