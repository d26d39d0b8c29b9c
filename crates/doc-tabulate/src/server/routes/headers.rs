//! Header suggestion endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use futures_util::future::try_join_all;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::suggested_headers;

use super::upload::read_upload;

/// Documents sent to the model when asking for headers
pub const MAX_HEADER_SAMPLES: usize = 5;

/// Response from header identification
#[derive(Debug, Serialize)]
pub struct HeadersResponse {
    /// Metadata headers first, then the model's suggestions
    pub headers: Vec<String>,
    /// Documents the suggestion was based on
    pub sampled: Vec<String>,
}

/// POST /api/headers - Suggest column headers for uploaded documents
pub async fn identify_headers(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<HeadersResponse>> {
    let upload = read_upload(multipart).await?;
    if upload.files.is_empty() {
        return Err(Error::invalid_input("No files provided"));
    }

    let samples = &upload.files[..upload.files.len().min(MAX_HEADER_SAMPLES)];
    let documents = try_join_all(samples.iter().map(|file| file.load())).await?;

    let suggestions = state.client().identify_headers(&documents).await?;
    tracing::info!("Suggested {} headers from {} documents", suggestions.len(), documents.len());

    Ok(Json(HeadersResponse {
        headers: suggested_headers(suggestions),
        sampled: documents.into_iter().map(|d| d.filename).collect(),
    }))
}
