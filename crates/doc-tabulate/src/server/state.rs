//! Application state for the extraction server

use std::sync::Arc;

use crate::config::TabulateConfig;
use crate::error::Result;
use crate::processing::JobRegistry;
use crate::providers::{create_client, ExtractionClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: TabulateConfig,
    /// Extraction provider (Gemini or Ollama)
    client: Arc<dyn ExtractionClient>,
    /// Jobs submitted through the API
    jobs: Arc<JobRegistry>,
}

impl AppState {
    /// Create application state with the provider selected in `config`
    pub fn new(config: TabulateConfig) -> Result<Self> {
        tracing::info!("Initializing application state (backend: {:?})...", config.backend);
        let client = create_client(&config)?;
        Ok(Self::with_client(config, client))
    }

    /// Create application state around an existing provider
    pub fn with_client(config: TabulateConfig, client: Arc<dyn ExtractionClient>) -> Self {
        let jobs = Arc::new(JobRegistry::with_retention(config.server.max_retained_jobs));
        Self {
            inner: Arc::new(AppStateInner {
                config,
                client,
                jobs,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &TabulateConfig {
        &self.inner.config
    }

    /// Get the extraction provider
    pub fn client(&self) -> Arc<dyn ExtractionClient> {
        Arc::clone(&self.inner.client)
    }

    /// Get the job registry
    pub fn jobs(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.inner.jobs)
    }

    /// Worker pool size for new runs
    pub fn concurrency(&self) -> usize {
        self.inner.config.processing.concurrency
    }
}
