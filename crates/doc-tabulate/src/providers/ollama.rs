//! Ollama vision client for document extraction with retry logic

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::types::{EncodedDocument, Record};

use super::extraction::ExtractionClient;
use super::response::{parse_headers, parse_record};
use super::retry::{retry_request, status_error};

/// Ollama API client for vision models (llama3.2-vision, llava, ...)
pub struct OllamaVisionClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<&'a str>,
    format: &'static str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaVisionClient {
    /// Create a new Ollama client with retry support
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            config: LlmConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config.clone()
            },
        })
    }

    /// Vision models only take raster images
    fn check_supported(document: &EncodedDocument) -> Result<()> {
        if document.mime_type.starts_with("image/") {
            Ok(())
        } else {
            Err(Error::extraction(
                &document.filename,
                format!("{} is not supported by Ollama vision models; convert it to an image", document.mime_type),
            ))
        }
    }

    /// Run `/api/generate` with images attached, returning the raw response text
    async fn generate(&self, prompt: &str, documents: &[&EncodedDocument]) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let url = url.as_str();
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            images: documents.iter().map(|d| d.data.as_str()).collect(),
            format: "json",
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };
        let request = &request;

        retry_request(self.config.max_retries, || async move {
            let response = self
                .client
                .post(url)
                .json(request)
                .send()
                .await
                .map_err(|e| Error::unavailable(format!("Generation request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, format!("Generation failed: HTTP {} - {}", status, body)));
            }

            let generate_response: GenerateResponse = response
                .json()
                .await
                .map_err(|e| Error::llm(format!("Failed to parse generation response: {}", e)))?;

            Ok(generate_response.response)
        })
        .await
    }
}

#[async_trait]
impl ExtractionClient for OllamaVisionClient {
    async fn identify_headers(&self, documents: &[EncodedDocument]) -> Result<Vec<String>> {
        let images: Vec<&EncodedDocument> = documents
            .iter()
            .filter(|d| Self::check_supported(d).is_ok())
            .collect();
        if images.is_empty() {
            return Err(Error::invalid_input("no image documents to sample headers from"));
        }

        let filenames: Vec<&str> = images.iter().map(|d| d.filename.as_str()).collect();
        let prompt = PromptBuilder::build_header_prompt(&filenames);

        tracing::info!("Identifying headers from {} images with {}", images.len(), self.config.model);
        let text = self.generate(&prompt, &images).await?;
        parse_headers(&text)
    }

    async fn extract_one(
        &self,
        content_headers: &[String],
        instructions: &str,
        document: &EncodedDocument,
    ) -> Result<Record> {
        Self::check_supported(document)?;
        let prompt = PromptBuilder::build_extraction_prompt(content_headers, instructions);

        tracing::debug!("Extracting {} with {}", document.filename, self.config.model);
        let text = self.generate(&prompt, &[document]).await?;
        parse_record(&text)
    }

    /// Check if Ollama is available
    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Stub Ollama that fails the first `fail_first` generate calls with 500
    async fn stub_server(fail_first: usize, response: &str) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let response = response.to_string();

        let app = Router::new()
            .route("/api/tags", get(|| async { Json(json!({ "models": [] })) }))
            .route(
                "/api/generate",
                post(
                    move |State((calls, response)): State<(Arc<AtomicUsize>, String)>, Json(body): Json<Value>| async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(body["format"], "json");
                        assert_eq!(body["stream"], false);
                        assert_eq!(body["images"][0], "AQID");
                        if n < fail_first {
                            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "model loading" })))
                        } else {
                            (StatusCode::OK, Json(json!({ "response": response })))
                        }
                    },
                ),
            )
            .with_state((calls.clone(), response));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/", addr), calls)
    }

    fn image(name: &str) -> EncodedDocument {
        EncodedDocument {
            filename: name.to_string(),
            mime_type: "image/jpeg".to_string(),
            size_bytes: 3,
            data: "AQID".to_string(),
        }
    }

    fn config(base_url: String, max_retries: u32) -> LlmConfig {
        LlmConfig {
            base_url,
            max_retries,
            ..LlmConfig::ollama()
        }
    }

    #[tokio::test]
    async fn test_extract_one_parses_json_response() {
        let (base_url, calls) = stub_server(0, r#"{"Vendor": "ACME", "Total": null}"#).await;
        let client = OllamaVisionClient::new(&config(base_url, 0)).unwrap();

        let headers = vec!["Vendor".to_string(), "Total".to_string()];
        let record = client.extract_one(&headers, "", &image("r.jpg")).await.unwrap();

        assert_eq!(record.get("Vendor"), Some("ACME"));
        assert_eq!(record.get("Total"), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let (base_url, calls) = stub_server(1, r#"{"headers": ["Date"]}"#).await;
        let client = OllamaVisionClient::new(&config(base_url, 1)).unwrap();

        let headers = client.identify_headers(&[image("a.jpg")]).await.unwrap();
        assert_eq!(headers, vec!["Date"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pdf_rejected_without_request() {
        let (base_url, calls) = stub_server(0, "{}").await;
        let client = OllamaVisionClient::new(&config(base_url, 0)).unwrap();

        let pdf = EncodedDocument {
            mime_type: "application/pdf".to_string(),
            ..image("scan.pdf")
        };
        let err = client.extract_one(&["Total".to_string()], "", &pdf).await.unwrap_err();

        assert!(matches!(err, Error::Extraction { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let client = OllamaVisionClient::new(&config("http://127.0.0.1:9".to_string(), 0)).unwrap();
        assert!(!client.health_check().await.unwrap());
    }
}
