//! HTTP API
//!
//! - `GET /health`
//! - `POST /run` runs a job and answers with the ranking
//! - `POST /run/async` starts a job and answers with its id
//! - `GET /run/{job_id}` polls a job
//! - `DELETE /run/{job_id}` cancels a job
//!
//! Every failure is answered with `{error: {code, message, details}}`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use fitrank_core::{CoreError, ErrorCode, Job, JobError, JobProgress, JobStatus, RankedCompany};
use fitrank_runtime::{JobRegistry, RunRequest, RunSummary};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run_sync))
        .route("/run/async", post(run_async))
        .route("/run/{job_id}", get(get_run).delete(cancel_run))
        .with_state(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Error envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    details: Value,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: status_for(code),
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    fn unknown_job(id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            ..Self::new(ErrorCode::ValidationError, format!("unknown job: {}", id))
        }
    }

    /// Envelope for a job that ended `failed`
    fn from_job(job: &Job) -> Self {
        let error = job
            .error
            .clone()
            .unwrap_or_else(|| JobError::new(ErrorCode::ServiceUnavailable, "job failed"));
        let mut details = json!({ "runId": job.id });
        if let Some(extra) = error.details {
            details["details"] = extra;
        }
        Self::new(error.code, error.message).with_details(details)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::TimeoutError => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::new(e.code(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorCode::ValidationError, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDebug {
    pub web_signals_count: usize,
    pub normalization_misses: usize,
    pub duplicates: usize,
    pub classification_failures: usize,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub run_at: DateTime<Utc>,
}

/// Body of a `POST /run` answer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run_id: Uuid,
    pub processed_companies: usize,
    pub labeled_signals: usize,
    pub results: Vec<RankedCompany>,
    pub debug: RunDebug,
}

impl From<RunSummary> for RunResponse {
    fn from(summary: RunSummary) -> Self {
        let job = summary.job;
        Self {
            run_id: job.id,
            processed_companies: summary.processed_companies,
            labeled_signals: summary.labeled_signals,
            debug: RunDebug {
                web_signals_count: job.progress.raw_results,
                normalization_misses: job.progress.misses,
                duplicates: job.progress.duplicates,
                classification_failures: job.progress.classification_failures,
                status: job.status,
                error: job.error,
                run_at: job.created_at,
            },
            results: job.results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressView {
    #[serde(flatten)]
    pub counters: JobProgress,
    pub fraction: f64,
}

/// Body of `GET /run/{job_id}`
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub query: String,
    pub progress: ProgressView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RankedCompany>>,
    /// Human-readable summary for partial and failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let results = job.status.is_terminal().then_some(job.results);
        Self {
            job_id: job.id,
            status: job.status,
            query: job.query,
            progress: ProgressView {
                fraction: job.progress.stage.fraction(),
                counters: job.progress,
            },
            results,
            error_code: job.error.as_ref().map(|e| e.code),
            error: job.error.map(|e| e.message),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn run_sync(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let Json(request) = payload?;
    let summary = state.registry.run(&request).await?;

    if summary.job.status == JobStatus::Failed {
        warn!("Run {} failed", summary.job.id);
        return Err(ApiError::from_job(&summary.job));
    }
    Ok(Json(RunResponse::from(summary)))
}

pub async fn run_async(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = payload?;
    let job = state.registry.submit(&request)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job.id, "status": job.status }))))
}

pub async fn get_run(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<JobView>, ApiError> {
    let id = parse_job_id(&job_id)?;
    let job = state.registry.get(&id).ok_or_else(|| ApiError::unknown_job(&job_id))?;
    Ok(Json(JobView::from(job)))
}

pub async fn cancel_run(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let id = parse_job_id(&job_id)?;
    let job = state.registry.cancel(&id).ok_or_else(|| ApiError::unknown_job(&job_id))?;
    Ok(Json(JobView::from(job)))
}

fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::new(ErrorCode::ValidationError, format!("invalid job id: {}", raw)))
}
