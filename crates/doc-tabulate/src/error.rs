//! Error types for the extraction service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extraction service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Precondition violated by the caller (empty schema, nothing to retry, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Per-document extraction failure
    #[error("Extraction failed for '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Provider unreachable, rate limited or overloaded; worth another attempt
    #[error("LLM unavailable: {0}")]
    Unavailable(String),

    /// Provider answered, but not with the JSON shape we asked for
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Batch job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an unavailable-provider error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Whether a provider call failing with this error may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::Http(_))
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            Error::Extraction { filename, message } => (
                StatusCode::BAD_GATEWAY,
                "extraction_error",
                format!("Extraction failed for '{}': {}", filename, message),
            ),
            Error::Llm(msg) => (StatusCode::SERVICE_UNAVAILABLE, "llm_error", msg.clone()),
            Error::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "llm_unavailable", msg.clone())
            }
            Error::MalformedResponse(msg) => {
                (StatusCode::BAD_GATEWAY, "malformed_response", msg.clone())
            }
            Error::JobNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Job not found: {}", id),
            ),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (
                StatusCode::BAD_GATEWAY,
                "http_error",
                err.to_string(),
            ),
            Error::Csv(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "csv_error",
                err.to_string(),
            ),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_bad_request() {
        let response = Error::invalid_input("schema is empty").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_job_not_found_maps_to_404() {
        let response = Error::JobNotFound("abc".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_extraction_error_message() {
        let err = Error::extraction("scan.pdf", "timeout");
        assert_eq!(err.to_string(), "Extraction failed for 'scan.pdf': timeout");
    }
}
