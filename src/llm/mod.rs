//! External text-extraction and feature-analysis capabilities.
//!
//! The rest of the crate only sees the two traits defined here. Provider
//! clients (Ollama, OpenAI-compatible) implement both, so swapping vendors
//! is a change at this boundary only.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

mod error;
#[cfg(test)]
pub mod mock;
mod ollama;
mod openai;

pub use error::LlmError;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::config::{ProviderConfig, ProviderKind};

/// Whether an attachment is read as an image or as a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Document,
}

impl SourceKind {
    /// Images are recognized by their `image/*` media type; everything else
    /// is a document.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.trim().to_lowercase().starts_with("image/") {
            SourceKind::Image
        } else {
            SourceKind::Document
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            SourceKind::Image => "image",
            SourceKind::Document => "document",
        }
    }
}

/// One text-extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub data: &'a [u8],
    pub mime_type: &'a str,
    pub kind: SourceKind,
    pub instruction: &'a str,
}

/// One schema-constrained generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub schema: Value,
    pub temperature: f32,
}

/// Turns an uploaded file into text.
///
/// `Ok(None)` means the provider answered without any content.
#[async_trait]
pub trait TextExtractionService: Send + Sync {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<Option<String>, LlmError>;
}

/// Generates a structured analysis payload for a prompt.
///
/// `Ok(None)` means the provider answered without any content.
#[async_trait]
pub trait FeatureAnalysisService: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Option<String>, LlmError>;
}

/// The pair of capabilities a session needs.
#[derive(Clone)]
pub struct Providers {
    pub extraction: Arc<dyn TextExtractionService>,
    pub analysis: Arc<dyn FeatureAnalysisService>,
}

/// Create provider clients based on the configured provider kind.
pub fn create_providers(config: &ProviderConfig) -> Result<Providers, LlmError> {
    debug!(provider = %config.kind, base_url = %config.base_url(), "create_providers: called");
    match config.kind {
        ProviderKind::Ollama => {
            let client = Arc::new(OllamaClient::from_config(config)?);
            Ok(Providers {
                extraction: client.clone(),
                analysis: client,
            })
        }
        ProviderKind::OpenAi => {
            let client = Arc::new(OpenAiClient::from_config(config)?);
            Ok(Providers {
                extraction: client.clone(),
                analysis: client,
            })
        }
    }
}

/// Keep content only if the provider actually returned some.
pub(crate) fn non_empty(content: Option<String>) -> Option<String> {
    content.filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_mime() {
        assert_eq!(SourceKind::from_mime("image/png"), SourceKind::Image);
        assert_eq!(SourceKind::from_mime("IMAGE/JPEG"), SourceKind::Image);
        assert_eq!(SourceKind::from_mime("application/pdf"), SourceKind::Document);
        assert_eq!(SourceKind::from_mime("text/plain"), SourceKind::Document);
        assert_eq!(SourceKind::from_mime(""), SourceKind::Document);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("  ".to_string())), Some("  ".to_string()));
    }

    #[test]
    fn test_create_ollama_providers() {
        let config = ProviderConfig::default();
        assert!(create_providers(&config).is_ok());
    }
}
