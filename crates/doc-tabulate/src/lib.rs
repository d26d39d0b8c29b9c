//! doc-tabulate: batch document-to-table extraction
//!
//! Uploaded images and PDFs are sent one at a time to a vision model
//! (Gemini or a local Ollama model) that fills a caller-curated list of
//! column headers. A bounded pool of workers drains the batch, rows keep
//! their input order while results arrive out of order, and only the failed
//! documents are re-run on retry.

pub mod config;
pub mod error;
pub mod export;
pub mod generation;
pub mod processing;
pub mod providers;
pub mod server;
pub mod types;

pub use config::TabulateConfig;
pub use error::{Error, Result};
pub use processing::{BatchRunner, BatchUpdate, FinalResult, ResultTable, WorkItem};
pub use providers::ExtractionClient;
pub use types::{DocumentFile, Record, Row, Schema};
