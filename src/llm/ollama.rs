//! Ollama `/api/chat` client.
//!
//! Images are passed through the message `images` field; plain-text
//! documents are decoded and inlined after the instruction. Structured
//! analysis uses Ollama's `format` parameter with the full JSON schema.

use super::{
    non_empty, ExtractionRequest, FeatureAnalysisService, GenerationRequest, LlmError, SourceKind,
    TextExtractionService,
};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for a local or remote Ollama server.
pub struct OllamaClient {
    http_client: reqwest::Client,
    base_url: String,
    extraction_model: String,
    analysis_model: String,
    timeout_seconds: u64,
}

impl OllamaClient {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let client = Self {
            http_client,
            base_url: config.base_url(),
            extraction_model: config.extraction_model(),
            analysis_model: config.analysis_model(),
            timeout_seconds: config.timeout_seconds,
        };
        info!(
            "Ollama client ready at {} (extraction: {}, analysis: {})",
            client.base_url, client.extraction_model, client.analysis_model
        );
        Ok(client)
    }

    /// Send one non-streaming chat request and return the message content.
    async fn chat(&self, request: &OllamaChatRequest<'_>) -> Result<Option<String>, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(model = request.model, "chat: sending request to {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, &self.base_url, self.timeout_seconds))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| {
                LlmError::InvalidResponse(format!("Failed to parse Ollama response: {}", e))
            })?;

        let content = chat_response.message.and_then(|m| m.content);
        debug!(len = content.as_ref().map(|c| c.len()), "chat: response received");
        Ok(non_empty(content))
    }
}

#[async_trait]
impl TextExtractionService for OllamaClient {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<Option<String>, LlmError> {
        let message = match request.kind {
            SourceKind::Image => ChatMessage {
                role: "user".to_string(),
                content: request.instruction.to_string(),
                images: vec![BASE64.encode(request.data)],
            },
            SourceKind::Document if request.mime_type.starts_with("text/") => {
                let text = String::from_utf8_lossy(request.data);
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{}\n\n---\n{}", request.instruction, text),
                    images: Vec::new(),
                }
            }
            SourceKind::Document => {
                return Err(LlmError::Unsupported(format!(
                    "Ollama cannot read {} documents; use an image, plain text, or the openai provider",
                    request.mime_type
                )));
            }
        };

        let chat = OllamaChatRequest {
            model: &self.extraction_model,
            messages: vec![message],
            stream: false,
            format: None,
            options: None,
        };
        self.chat(&chat).await
    }
}

#[async_trait]
impl FeatureAnalysisService for OllamaClient {
    async fn generate(&self, request: GenerationRequest) -> Result<Option<String>, LlmError> {
        let chat = OllamaChatRequest {
            model: &self.analysis_model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt,
                images: Vec::new(),
            }],
            stream: false,
            format: Some(request.schema),
            options: Some(OllamaOptions {
                temperature: request.temperature,
            }),
        };
        self.chat(&chat).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Serve a canned `/api/chat` reply on an ephemeral port and record bodies.
    async fn fake_ollama(reply: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        let app = Router::new().route(
            "/api/chat",
            post(move |Json(body): Json<Value>| {
                let seen = seen_in_handler.clone();
                let reply = reply.clone();
                async move {
                    seen.lock().unwrap().push(body);
                    Json(reply)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    fn client_for(base_url: &str) -> OllamaClient {
        let config = ProviderConfig {
            base_url: Some(base_url.to_string()),
            analysis_model: Some("test-analysis".to_string()),
            extraction_model: Some("test-vision".to_string()),
            ..ProviderConfig::default()
        };
        OllamaClient::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_generate_sends_schema_and_temperature() {
        let (url, seen) = fake_ollama(json!({
            "message": {"role": "assistant", "content": "{\"ok\":1}"},
            "done": true
        }))
        .await;
        let client = client_for(&url);

        let out = client
            .generate(GenerationRequest {
                prompt: "Analyze this".to_string(),
                schema: json!({"type": "object"}),
                temperature: 0.2,
            })
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("{\"ok\":1}"));

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies[0]["model"], "test-analysis");
        assert_eq!(bodies[0]["stream"], false);
        assert_eq!(bodies[0]["format"]["type"], "object");
        assert!((bodies[0]["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_extract_image_sends_base64() {
        let (url, seen) =
            fake_ollama(json!({"message": {"role": "assistant", "content": "Screen text"}})).await;
        let client = client_for(&url);

        let out = client
            .extract(ExtractionRequest {
                data: b"png-bytes",
                mime_type: "image/png",
                kind: SourceKind::Image,
                instruction: "Extract all the text",
            })
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("Screen text"));

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies[0]["model"], "test-vision");
        assert_eq!(bodies[0]["messages"][0]["images"][0], BASE64.encode(b"png-bytes"));
        assert!(bodies[0].get("format").is_none());
    }

    #[tokio::test]
    async fn test_empty_content_is_none() {
        let (url, _) = fake_ollama(json!({"message": {"role": "assistant", "content": ""}})).await;
        let client = client_for(&url);

        let out = client
            .extract(ExtractionRequest {
                data: b"hello",
                mime_type: "text/plain",
                kind: SourceKind::Document,
                instruction: "Extract all the text",
            })
            .await
            .unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_pdf_is_unsupported() {
        let client = client_for("http://127.0.0.1:9");
        let err = client
            .extract(ExtractionRequest {
                data: b"%PDF-1.7",
                mime_type: "application/pdf",
                kind: SourceKind::Document,
                instruction: "Extract all the text",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unsupported(_)));
    }
}
