//! Multipart upload parsing shared by the header and extract endpoints

use axum::extract::Multipart;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::DocumentFile;

/// Parsed multipart form
#[derive(Debug, Default)]
pub struct Upload {
    /// Uploaded documents in form order
    pub files: Vec<DocumentFile>,
    /// `headers` field: JSON array of header names
    pub headers: Option<Vec<String>>,
    /// `instructions` field, free text
    pub instructions: String,
}

/// Read every field of a multipart form.
///
/// Text fields `headers` and `instructions` are recognized by name; any
/// other field is treated as a document.
pub async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid_input(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "headers" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::invalid_input(format!("Failed to read headers: {}", e)))?;
                let headers: Vec<String> = serde_json::from_slice(&data)
                    .map_err(|e| Error::invalid_input(format!("headers must be a JSON array of strings: {}", e)))?;
                upload.headers = Some(headers);
            }
            "instructions" => {
                upload.instructions = field
                    .text()
                    .await
                    .map_err(|e| Error::invalid_input(format!("Failed to read instructions: {}", e)))?;
            }
            _ => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("file_{}.bin", Uuid::new_v4()));
                let mime_type = field.content_type().map(|s| s.to_string());

                // Skip unreadable parts
                let data = match field.bytes().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Failed to read file {}: {}", filename, e);
                        continue;
                    }
                };

                tracing::info!("Received file: {} ({} bytes)", filename, data.len());
                upload.files.push(DocumentFile::from_bytes(filename, mime_type, data));
            }
        }
    }

    Ok(upload)
}
