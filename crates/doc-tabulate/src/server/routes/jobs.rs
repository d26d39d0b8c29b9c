//! Extraction job endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::export::rows_to_csv;
use crate::processing::{run_job, JobDetail, JobSummary, JobWork, RegistryStats};
use crate::server::state::AppState;
use crate::types::Schema;

use super::upload::read_upload;

/// Response when a run or retry is started
#[derive(Debug, Serialize)]
pub struct JobStartedResponse {
    pub job_id: Uuid,
    pub files_queued: usize,
    pub message: String,
}

/// Response for the job list
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub stats: RegistryStats,
}

/// POST /api/extract - Start extraction over uploaded files
pub async fn start_extraction(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<JobStartedResponse>> {
    let upload = read_upload(multipart).await?;

    let headers = upload
        .headers
        .ok_or_else(|| Error::invalid_input("Missing \"headers\" field"))?;
    let schema = Schema::new(headers)?;
    if upload.files.is_empty() {
        return Err(Error::invalid_input("No files provided"));
    }

    let files_queued = upload.files.len();
    let registry = state.jobs();
    let job_id = registry.create(schema, upload.instructions, files_queued);

    tokio::spawn(run_job(
        registry,
        state.client(),
        state.concurrency(),
        job_id,
        JobWork::Run(upload.files),
    ));

    Ok(Json(JobStartedResponse {
        job_id,
        files_queued,
        message: format!("Extraction started. Use /api/jobs/{} to follow progress.", job_id),
    }))
}

/// GET /api/jobs - List all jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let registry = state.jobs();
    Json(JobListResponse {
        jobs: registry.list(),
        stats: registry.stats(),
    })
}

/// GET /api/jobs/:id - Live rows, progress and failed files
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobDetail>> {
    state
        .jobs()
        .get(job_id)
        .map(Json)
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
}

/// DELETE /api/jobs/:id - Drop a finished job and its uploaded documents
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.jobs().remove(job_id)?;
    Ok(Json(serde_json::json!({ "deleted": job_id })))
}

/// POST /api/jobs/:id/retry - Re-run only the failed documents
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStartedResponse>> {
    let registry = state.jobs();
    let plan = registry.begin_retry(job_id)?;
    let files_queued = plan.failed_items.len();

    tracing::info!("Retrying {} failed documents for job {}", files_queued, job_id);
    tokio::spawn(run_job(
        registry,
        state.client(),
        state.concurrency(),
        job_id,
        JobWork::Retry(plan),
    ));

    Ok(Json(JobStartedResponse {
        job_id,
        files_queued,
        message: format!("Retry started for {} documents.", files_queued),
    }))
}

/// GET /api/jobs/:id/csv - Export current rows as CSV
pub async fn export_csv(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (schema, rows) = state.jobs().rows(job_id)?;
    let body = rows_to_csv(&schema, &rows)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"extraction-{}.csv\"", job_id),
            ),
        ],
        body,
    ))
}
