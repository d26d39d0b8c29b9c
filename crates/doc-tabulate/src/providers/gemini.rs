//! Gemini client for document extraction via the Generative Language API
//!
//! Documents are sent inline as base64 parts; the model is asked for
//! `application/json` output.

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

/// Gemini client authenticated with an API key
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("Gemini API key missing (set DOC_TABULATE_API_KEY or GEMINI_API_KEY)".to_string())
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    /// Get the API endpoint URL
    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, prompt: String, documents: &[&EncodedDocument]) -> GenerateRequest {
        let mut parts = vec![Part::text(prompt)];
        parts.extend(documents.iter().map(|doc| Part::inline(doc)));

        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json".to_string(),
            },
        }
    }

    /// POST a request and return the first candidate's text
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let url = self.endpoint();
        let url = url.as_str();

        retry_request(self.max_retries, || async move {
            let response = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| Error::unavailable(format!("Gemini request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, format!("Gemini generation failed ({}): {}", status, body)));
            }

            let gen_response: GenerateResponse = response
                .json()
                .await
                .map_err(|e| Error::llm(format!("Failed to parse Gemini response: {}", e)))?;

            gen_response.into_text()
        })
        .await
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn inline(document: &EncodedDocument) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: document.mime_type.clone(),
                data: document.data.clone(),
            }),
        }
    }
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(Error::llm(format!("Gemini blocked the request: {}", reason)));
        }

        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::malformed("No text in Gemini response"));
        }
        Ok(text)
    }
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[async_trait]
impl ExtractionClient for GeminiClient {
    async fn identify_headers(&self, documents: &[EncodedDocument]) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Err(Error::invalid_input("no sample documents provided"));
        }

        let filenames: Vec<&str> = documents.iter().map(|d| d.filename.as_str()).collect();
        let prompt = PromptBuilder::build_header_prompt(&filenames);
        let request = self.build_request(prompt, &documents.iter().collect::<Vec<_>>());

        tracing::info!("Identifying headers from {} documents with {}", documents.len(), self.model);
        let text = self.generate(&request).await?;
        parse_headers(&text)
    }

    async fn extract_one(
        &self,
        content_headers: &[String],
        instructions: &str,
        document: &EncodedDocument,
    ) -> Result<Record> {
        let prompt = PromptBuilder::build_extraction_prompt(content_headers, instructions);
        let request = self.build_request(prompt, &[document]);

        tracing::debug!("Extracting {} ({} bytes) with {}", document.filename, document.size_bytes, self.model);
        let text = self.generate(&request).await?;
        parse_record(&text)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model);

        match self.client.get(&url).header("x-goog-api-key", &self.api_key).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
