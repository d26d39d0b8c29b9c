//! Configuration for the extraction service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::processing::DEFAULT_MAX_RETAINED_JOBS;

/// Upper bound for per-request provider retries
pub const MAX_LLM_RETRIES: u32 = 5;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabulateConfig {
    /// Extraction backend (gemini or ollama)
    #[serde(default)]
    pub backend: BackendProvider,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Batch processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl TabulateConfig {
    /// Default config file location (`<config dir>/doc-tabulate/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("doc-tabulate").join("config.toml"))
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file at the default location is not an error; an explicit
    /// path that cannot be read is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))?;
        config.apply_backend_defaults();
        Ok(config)
    }

    /// Swap Gemini defaults left in `[llm]` for Ollama ones when the Ollama backend is selected
    pub fn apply_backend_defaults(&mut self) {
        if self.backend != BackendProvider::Ollama {
            return;
        }
        let gemini = LlmConfig::default();
        let ollama = LlmConfig::ollama();
        if self.llm.base_url == gemini.base_url {
            self.llm.base_url = ollama.base_url;
        }
        if self.llm.model == gemini.model {
            self.llm.model = ollama.model;
        }
        if self.llm.timeout_secs == gemini.timeout_secs {
            self.llm.timeout_secs = ollama.timeout_secs;
        }
        if self.llm.max_retries == gemini.max_retries {
            self.llm.max_retries = ollama.max_retries;
        }
    }

    /// Apply `DOC_TABULATE_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("DOC_TABULATE_API_KEY").or_else(|_| std::env::var("GEMINI_API_KEY")) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key.trim().to_string());
            }
        }
        if let Ok(model) = std::env::var("DOC_TABULATE_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("DOC_TABULATE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid DOC_TABULATE_PORT: {}", port),
            }
        }
    }

    /// Check values that would otherwise fail deep inside a batch run
    pub fn validate(&self) -> Result<()> {
        if self.processing.concurrency == 0 {
            return Err(Error::Config("processing.concurrency must be at least 1".to_string()));
        }
        if self.llm.max_retries > MAX_LLM_RETRIES {
            return Err(Error::Config(format!(
                "llm.max_retries must be at most {} (got {})",
                MAX_LLM_RETRIES, self.llm.max_retries
            )));
        }
        if self.backend == BackendProvider::Gemini && self.llm.api_key.is_none() {
            tracing::warn!("Gemini backend selected but no API key configured");
        }
        Ok(())
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of concurrent extraction workers (default: 5)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize { 5 }

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
    /// Jobs kept in memory before the oldest finished ones are evicted (0 keeps all)
    pub max_retained_jobs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
            max_retained_jobs: DEFAULT_MAX_RETAINED_JOBS,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (Gemini only)
    pub api_key: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl LlmConfig {
    /// Defaults for a local Ollama vision model
    pub fn ollama() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
            api_key: None,
            temperature: 0.1,
            timeout_secs: 300, // vision models on CPU are slow
            max_retries: 2,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            temperature: 0.1, // Low for faithful field extraction
            timeout_secs: 120,
            max_retries: 0,
        }
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Google Generative Language API (API key)
    #[default]
    Gemini,
    /// Local Ollama server with a vision model
    Ollama,
}
