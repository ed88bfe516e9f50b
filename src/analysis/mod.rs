//! Feature analysis.
//!
//! Builds the analysis prompt, calls the schema-constrained generation
//! capability and hands the raw payload to the schema contract.

pub mod prompt;

pub use prompt::build_prompt;

use crate::llm::{FeatureAnalysisService, GenerationRequest};
use crate::models::{AnalysisInput, AnalysisResult};
use crate::schema::{self, ParseError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The analysis call failed or came back empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AnalysisFailure {
    pub message: String,
    pub raw_payload: Option<String>,
}

/// Any failure between sending the prompt and holding a typed result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Failure(#[from] AnalysisFailure),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl AnalyzeError {
    /// The model payload, when there was one.
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            AnalyzeError::Failure(f) => f.raw_payload.as_deref(),
            AnalyzeError::Parse(p) => Some(p.raw_payload()),
        }
    }
}

/// Gateway in front of the analysis capability.
#[derive(Clone)]
pub struct AnalysisGateway {
    service: Arc<dyn FeatureAnalysisService>,
    temperature: f32,
}

impl AnalysisGateway {
    pub fn new(service: Arc<dyn FeatureAnalysisService>, temperature: f32) -> Self {
        Self {
            service,
            temperature,
        }
    }

    /// Run one analysis call and return the raw payload.
    pub async fn analyze(&self, input: &AnalysisInput) -> Result<String, AnalysisFailure> {
        let prompt = build_prompt(input);
        info!(
            "Requesting analysis ({} chars of feature text{})",
            input.combined_feature_text.len(),
            if input.clarification_notes.is_some() {
                ", with clarification notes"
            } else {
                ""
            }
        );
        debug!(prompt_len = prompt.len(), temperature = self.temperature, "analyze: called");

        let response = self
            .service
            .generate(GenerationRequest {
                prompt,
                schema: schema::response_schema(),
                temperature: self.temperature,
            })
            .await
            .map_err(|e| {
                warn!("Analysis call failed: {}", e);
                AnalysisFailure {
                    message: e.to_string(),
                    raw_payload: None,
                }
            })?;

        match response {
            Some(raw) if !raw.trim().is_empty() => Ok(raw),
            other => {
                warn!("Analysis returned an empty response");
                Err(AnalysisFailure {
                    message: "Analysis returned an empty response.".to_string(),
                    raw_payload: other,
                })
            }
        }
    }

    /// Analyze and validate against the schema contract.
    pub async fn analyze_structured(
        &self,
        input: &AnalysisInput,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let raw = self.analyze(input).await?;
        let result = schema::parse(&raw).map_err(|e| {
            warn!("Analysis response rejected: {}", e);
            e
        })?;
        Ok(result)
    }
}
