//! Attachment text extraction.
//!
//! Turns an uploaded image or document into plain text through the
//! configured [`TextExtractionService`]. A blank answer is a failure, never
//! an empty success. There is exactly one attempt per call; retrying is up
//! to the session.

use crate::llm::{ExtractionRequest, SourceKind, TextExtractionService};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Media type of Word documents.
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Text extracted from an attachment. Never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText(String);

impl ExtractedText {
    /// Wraps `text` if it carries any non-whitespace content.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            None
        } else {
            Some(Self(text))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extraction did not produce usable text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ExtractionFailure {
    pub reason: String,
}

impl ExtractionFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The instruction sent alongside every attachment.
pub fn instruction_for(kind: SourceKind) -> String {
    format!(
        "Extract all the text from this {} accurately. Preserve the structure as much as possible. Do not add any extra commentary.",
        kind.noun()
    )
}

/// Gateway in front of the extraction capability.
#[derive(Clone)]
pub struct ExtractionGateway {
    service: Arc<dyn TextExtractionService>,
}

impl ExtractionGateway {
    pub fn new(service: Arc<dyn TextExtractionService>) -> Self {
        Self { service }
    }

    /// Extract text from `file_bytes`, dispatching on `mime_type`.
    pub async fn extract(
        &self,
        file_bytes: &[u8],
        mime_type: &str,
    ) -> Result<ExtractedText, ExtractionFailure> {
        let kind = SourceKind::from_mime(mime_type);
        let instruction = instruction_for(kind);
        info!(
            "Extracting text from {} ({}, {} bytes)",
            kind.noun(),
            mime_type,
            file_bytes.len()
        );

        let response = self
            .service
            .extract(ExtractionRequest {
                data: file_bytes,
                mime_type,
                kind,
                instruction: &instruction,
            })
            .await
            .map_err(|e| {
                warn!("Extraction call failed: {}", e);
                ExtractionFailure::new(e.to_string())
            })?;

        let Some(text) = response else {
            warn!("Extraction returned no content");
            return Err(ExtractionFailure::new("No text could be extracted."));
        };

        let extracted = ExtractedText::new(text)
            .ok_or_else(|| ExtractionFailure::new("No text could be extracted."))?;
        debug!(chars = extracted.as_str().len(), "extract: success");
        Ok(extracted)
    }
}

/// Whether an attachment is one of the accepted inputs: images, PDF,
/// plain text, and Word documents (recognized by name or media type).
pub fn is_supported_attachment(file_name: &str, mime_type: &str) -> bool {
    let mime = mime_type.trim().to_lowercase();
    mime.starts_with("image/")
        || mime == "application/pdf"
        || mime == "text/plain"
        || mime == DOCX_MIME
        || file_name.to_lowercase().ends_with(".docx")
}

/// Infer the media type of a local file from its extension.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "docx" => DOCX_MIME,
        _ => return None,
    };
    Some(mime)
}
