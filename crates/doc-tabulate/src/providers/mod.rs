//! Extraction providers
//!
//! Trait-based abstraction that allows switching between the hosted Gemini
//! API and a local Ollama vision model.

pub mod extraction;
pub mod gemini;
pub mod ollama;
pub mod response;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::config::{BackendProvider, TabulateConfig};
use crate::error::Result;

pub use extraction::ExtractionClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaVisionClient;

/// Build the extraction client selected by `config.backend`
pub fn create_client(config: &TabulateConfig) -> Result<Arc<dyn ExtractionClient>> {
    let client: Arc<dyn ExtractionClient> = match config.backend {
        BackendProvider::Gemini => Arc::new(GeminiClient::new(&config.llm)?),
        BackendProvider::Ollama => Arc::new(OllamaVisionClient::new(&config.llm)?),
    };

    tracing::info!("Using {} provider with model {}", client.name(), client.model());
    Ok(client)
}
