//! OpenAI-compatible chat completions client.
//!
//! Images travel as `image_url` data URLs, documents as `file` content
//! parts. Structured analysis uses strict `json_schema` response format.

use super::{
    non_empty, ExtractionRequest, FeatureAnalysisService, GenerationRequest, LlmError, SourceKind,
    TextExtractionService,
};
use crate::config::ProviderConfig;
use crate::extraction::DOCX_MIME;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Name the schema is registered under in the request.
const SCHEMA_NAME: &str = "feature_analysis";

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI or any server exposing `/v1/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    extraction_model: String,
    analysis_model: String,
    timeout_seconds: u64,
}

impl OpenAiClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let client = Self {
            http,
            api_key,
            base_url: config.base_url(),
            extraction_model: config.extraction_model(),
            analysis_model: config.analysis_model(),
            timeout_seconds: config.timeout_seconds,
        };
        info!(
            "OpenAI client ready at {} (extraction: {}, analysis: {})",
            client.base_url, client.extraction_model, client.analysis_model
        );
        Ok(client)
    }

    /// Build the body of an extraction request.
    fn extraction_body(&self, request: &ExtractionRequest<'_>) -> Value {
        let data_url = format!("data:{};base64,{}", request.mime_type, BASE64.encode(request.data));
        let attachment = match request.kind {
            SourceKind::Image => json!({
                "type": "image_url",
                "image_url": { "url": data_url },
            }),
            SourceKind::Document => json!({
                "type": "file",
                "file": { "filename": document_filename(request.mime_type), "file_data": data_url },
            }),
        };

        json!({
            "model": self.extraction_model,
            "messages": [{
                "role": "user",
                "content": [attachment, { "type": "text", "text": request.instruction }],
            }],
        })
    }

    /// Build the body of a schema-constrained analysis request.
    fn generation_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.analysis_model,
            "temperature": request.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": SCHEMA_NAME,
                    "strict": true,
                    "schema": request.schema,
                },
            },
            "messages": [{ "role": "user", "content": request.prompt }],
        })
    }

    async fn complete(&self, body: &Value) -> Result<Option<String>, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model = %body["model"], "complete: sending request to {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, &self.base_url, self.timeout_seconds))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| {
                LlmError::InvalidResponse(format!("Failed to parse OpenAI response: {}", e))
            })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);
        Ok(non_empty(content))
    }
}

/// File name hint sent with document parts; some servers dispatch on it.
fn document_filename(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => "document.pdf",
        "text/plain" => "document.txt",
        DOCX_MIME => "document.docx",
        _ => "document",
    }
}

#[async_trait]
impl TextExtractionService for OpenAiClient {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<Option<String>, LlmError> {
        let body = self.extraction_body(&request);
        self.complete(&body).await
    }
}

#[async_trait]
impl FeatureAnalysisService for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<Option<String>, LlmError> {
        let body = self.generation_body(&request);
        self.complete(&body).await
    }
}
