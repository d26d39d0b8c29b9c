//! API routes for the extraction server

pub mod headers;
pub mod jobs;
pub mod upload;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::Result;
use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Uploads - with larger body limit
        .route(
            "/headers",
            post(headers::identify_headers).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/extract",
            post(jobs::start_extraction).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Job management
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:id/retry", post(jobs::retry_job))
        .route("/jobs/:id/csv", get(jobs::export_csv))
        // Provider
        .route("/provider/health", get(provider_health))
        // Info
        .route("/info", get(info))
}

/// Provider health response
#[derive(Debug, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub model: String,
    pub healthy: bool,
}

/// GET /api/provider/health - Credentials and connectivity smoke test
async fn provider_health(State(state): State<AppState>) -> Result<Json<ProviderHealth>> {
    let client = state.client();
    let healthy = client.health_check().await?;

    if !healthy {
        tracing::warn!("Provider {} failed its health check", client.name());
    }

    Ok(Json(ProviderHealth {
        provider: client.name().to_string(),
        model: client.model().to_string(),
        healthy,
    }))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let client = state.client();
    Json(serde_json::json!({
        "name": "doc-tabulate",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Batch document-to-table extraction with live progress and retry of failed documents",
        "provider": client.name(),
        "model": client.model(),
        "concurrency": state.concurrency(),
        "endpoints": {
            "POST /api/headers": "Suggest column headers for uploaded documents",
            "POST /api/extract": "Upload documents with headers and instructions, start extraction",
            "GET /api/jobs": "List all jobs and registry stats",
            "GET /api/jobs/:id": "Live rows, progress and failed documents",
            "DELETE /api/jobs/:id": "Drop a finished job and its documents",
            "POST /api/jobs/:id/retry": "Re-run only the failed documents",
            "GET /api/jobs/:id/csv": "Export current rows as CSV",
            "GET /api/provider/health": "Provider connectivity check"
        },
        "jobs": state.jobs().stats()
    }))
}
