//! LLM provider error types

use thiserror::Error;

/// Errors raised while talking to an extraction or analysis provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to provider at {0}. Is it running?")]
    Connect(String),

    #[error("Failed to send request: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Provider API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported input for this provider: {0}")]
    Unsupported(String),

    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(String),
}

impl LlmError {
    /// Classify a transport error the way users need to see it.
    pub fn from_transport(err: reqwest::Error, base_url: &str, timeout_seconds: u64) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(timeout_seconds)
        } else if err.is_connect() {
            LlmError::Connect(base_url.to_string())
        } else {
            LlmError::Network(err)
        }
    }
}
