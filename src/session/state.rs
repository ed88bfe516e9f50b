//! Session state owned by the orchestration controller.

use crate::extraction::ExtractedText;
use crate::models::{AnalysisInput, AnalysisResult, FeatureRequest};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Extracting,
    Analyzing,
    Presenting,
    Errored,
}

impl Phase {
    /// Whether an external call is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Extracting | Phase::Analyzing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Extracting => write!(f, "extracting"),
            Phase::Analyzing => write!(f, "analyzing"),
            Phase::Presenting => write!(f, "presenting"),
            Phase::Errored => write!(f, "errored"),
        }
    }
}

/// Which step produced an error. Extraction errors get their own
/// recovery options ("try another file", "paste text instead").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorOrigin {
    Extraction,
    Analysis,
}

/// The error surfaced to the user while the session is `Errored`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub origin: ErrorOrigin,
    pub message: String,
    /// Model payload kept for debugging, when there was one.
    pub raw_payload: Option<String>,
}

impl ErrorRecord {
    pub fn is_extraction_origin(&self) -> bool {
        self.origin == ErrorOrigin::Extraction
    }
}

/// The last user-initiated transition, replayed by retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Attempt {
    Run,
    Refine { notes: String },
}

/// Everything one session holds. Reset wholesale on "new analysis".
#[derive(Debug, Default)]
pub struct SessionState {
    pub phase: Phase,
    pub request: Option<FeatureRequest>,
    pub result: Option<AnalysisResult>,
    /// Cached text of the attachment, reused by refinement.
    pub extracted_text: Option<ExtractedText>,
    /// Input of the most recent analysis call.
    pub last_input: Option<AnalysisInput>,
    pub last_error: Option<ErrorRecord>,
    pub(crate) last_attempt: Option<Attempt>,
}

/// An operation the session cannot accept in its current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Please provide a feature description or attach a file.")]
    EmptyRequest,

    #[error("Please enter clarification notes before refining.")]
    EmptyNotes,

    #[error("Cannot {action} while the session is {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },
}
