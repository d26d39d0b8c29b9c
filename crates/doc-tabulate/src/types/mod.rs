//! Core types for the extraction pipeline

pub mod document;
pub mod record;
pub mod schema;

pub use document::{collect_documents, DocumentFile, EncodedDocument, FileSource, SUPPORTED_EXTENSIONS};
pub use record::{Record, Row, MISSING_VALUE};
pub use schema::{
    dedup_headers, is_metadata_header, suggested_headers, Schema, DOCUMENT_NAME_HEADER, METADATA_HEADERS,
    SERIAL_NUMBER_HEADER,
};
