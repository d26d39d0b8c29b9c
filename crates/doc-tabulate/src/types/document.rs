//! Input documents and their encoded form

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Extensions accepted when walking directories
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "webp", "gif", "tif", "tiff", "bmp", "heic"];

/// Where a document's bytes come from
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Uploaded bytes held in memory
    Memory(Bytes),
    /// File on disk, read lazily by the worker that claims it
    Path(PathBuf),
}

/// A document handed to the batch pipeline
#[derive(Debug, Clone)]
pub struct DocumentFile {
    /// Display name, used for the `Document Name` column
    pub name: String,
    /// MIME type, if known up front
    pub mime_type: Option<String>,
    /// Byte source
    pub source: FileSource,
}

impl DocumentFile {
    /// Document from uploaded bytes
    pub fn from_bytes(name: impl Into<String>, mime_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.filter(|m| !m.is_empty() && m != "application/octet-stream"),
            source: FileSource::Memory(data.into()),
        }
    }

    /// Document backed by a file on disk
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        Self {
            name,
            mime_type: None,
            source: FileSource::Path(path),
        }
    }

    /// MIME type from the upload, else guessed from the extension
    pub fn resolved_mime_type(&self) -> String {
        self.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
    }

    /// Read the bytes and base64-encode them for the provider
    pub async fn load(&self) -> Result<EncodedDocument> {
        let data = match &self.source {
            FileSource::Memory(bytes) => bytes.clone(),
            FileSource::Path(path) => Bytes::from(tokio::fs::read(path).await?),
        };

        if data.is_empty() {
            return Err(Error::extraction(&self.name, "file is empty"));
        }

        Ok(EncodedDocument {
            filename: self.name.clone(),
            mime_type: self.resolved_mime_type(),
            size_bytes: data.len(),
            data: STANDARD.encode(&data),
        })
    }
}

/// A document ready to be sent to an extraction provider
#[derive(Debug, Clone, Serialize)]
pub struct EncodedDocument {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: usize,
    /// Base64 (standard alphabet) payload
    #[serde(skip_serializing)]
    pub data: String,
}

/// Expand files and directories into a sorted list of supported documents
pub fn collect_documents(paths: &[PathBuf]) -> Vec<DocumentFile> {
    let mut found: Vec<PathBuf> = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() && is_supported(entry.path()) {
                    found.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            found.push(path.clone());
        } else {
            tracing::warn!("Skipping missing path: {}", path.display());
        }
    }

    found.sort();
    found.dedup();
    found.into_iter().map(DocumentFile::from_path).collect()
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_guessed_from_extension() {
        let doc = DocumentFile::from_bytes("scan.PNG", None, vec![1u8, 2, 3]);
        assert_eq!(doc.resolved_mime_type(), "image/png");

        let doc = DocumentFile::from_bytes("invoice.pdf", Some("application/octet-stream".into()), vec![1u8]);
        assert_eq!(doc.resolved_mime_type(), "application/pdf");
    }

    #[tokio::test]
    async fn test_load_encodes_base64() {
        let doc = DocumentFile::from_bytes("a.png", Some("image/png".into()), b"hello".to_vec());
        let encoded = doc.load().await.unwrap();
        assert_eq!(encoded.data, "aGVsbG8=");
        assert_eq!(encoded.size_bytes, 5);
        assert_eq!(encoded.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_load_from_path_and_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("receipt.jpg");
        let empty = dir.path().join("blank.jpg");
        std::fs::write(&full, b"jpegbytes").unwrap();
        std::fs::write(&empty, b"").unwrap();

        let encoded = DocumentFile::from_path(&full).load().await.unwrap();
        assert_eq!(encoded.filename, "receipt.jpg");
        assert_eq!(encoded.mime_type, "image/jpeg");

        let err = DocumentFile::from_path(&empty).load().await.unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_collect_documents_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let docs = collect_documents(&[dir.path().to_path_buf()]);
        let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.pdf"]);
    }
}
