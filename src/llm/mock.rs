//! Scripted provider doubles for unit tests.

use super::{
    ExtractionRequest, FeatureAnalysisService, GenerationRequest, LlmError, SourceKind,
    TextExtractionService,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Scripted = Result<Option<String>, LlmError>;

fn next_response(queue: &Mutex<VecDeque<Scripted>>) -> Scripted {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(LlmError::InvalidResponse("No more mock responses".to_string())))
}

/// Extraction double that replays scripted responses in order.
#[derive(Default)]
pub struct MockExtractionService {
    responses: Mutex<VecDeque<Scripted>>,
    call_count: AtomicUsize,
    calls: Mutex<Vec<(String, SourceKind, String)>>,
}

impl MockExtractionService {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Always answers with the given text.
    pub fn returning(text: &str) -> Self {
        Self::new((0..8).map(|_| Ok(Some(text.to_string()))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// `(mime_type, kind, instruction)` of every call so far.
    pub fn calls(&self) -> Vec<(String, SourceKind, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextExtractionService for MockExtractionService {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<Option<String>, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push((
            request.mime_type.to_string(),
            request.kind,
            request.instruction.to_string(),
        ));
        next_response(&self.responses)
    }
}

/// Analysis double that replays scripted payloads and records prompts.
#[derive(Default)]
pub struct MockAnalysisService {
    responses: Mutex<VecDeque<Scripted>>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockAnalysisService {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Always answers with the given payload.
    pub fn returning(payload: &str) -> Self {
        Self::new((0..8).map(|_| Ok(Some(payload.to_string()))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeatureAnalysisService for MockAnalysisService {
    async fn generate(&self, request: GenerationRequest) -> Result<Option<String>, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        next_response(&self.responses)
    }
}
