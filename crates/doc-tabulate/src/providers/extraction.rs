//! Extraction provider trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EncodedDocument, Record};

/// Trait for AI-backed document extraction
///
/// Implementations:
/// - `GeminiClient`: Google Generative Language API (gemini-2.0-flash, ...)
/// - `OllamaVisionClient`: Local Ollama server with a vision model
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Suggest column headers for a batch of sample documents
    async fn identify_headers(&self, documents: &[EncodedDocument]) -> Result<Vec<String>>;

    /// Extract one record for `content_headers` from a single document
    async fn extract_one(
        &self,
        content_headers: &[String],
        instructions: &str,
        document: &EncodedDocument,
    ) -> Result<Record>;

    /// Check credentials and connectivity
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
