//! The orchestration state machine.
//!
//! Sequences extraction, analysis and refinement for one user session:
//!
//! ```text
//! Idle -> [Extracting] -> Analyzing -> Presenting
//!              |              |           |
//!              +--> Errored <-+           +--> Analyzing (refine)
//! ```
//!
//! Every operation takes `&mut self`, so a session can never have two
//! external calls in flight. No failure is retried automatically.

use super::state::{Attempt, ErrorOrigin, ErrorRecord, Phase, RequestError, SessionState};
use crate::analysis::AnalysisGateway;
use crate::enrichment::{self, Enrichment};
use crate::extraction::{ExtractedText, ExtractionFailure, ExtractionGateway};
use crate::models::{AnalysisInput, AnalysisResult, FeatureRequest};
use tracing::{debug, info, warn};

/// Placed between typed text and text extracted from an attachment.
pub const EXTRACTED_SEPARATOR: &str = "\n\n--- Extracted from file ---\n";

type PhaseListener = Box<dyn Fn(Phase) + Send + Sync>;

/// Combine typed text with extracted text. Typed text comes first and is
/// only kept when it is not blank.
pub fn merge_feature_text(typed: &str, extracted: &ExtractedText) -> String {
    if typed.trim().is_empty() {
        extracted.as_str().to_string()
    } else {
        format!("{}{}{}", typed, EXTRACTED_SEPARATOR, extracted)
    }
}

/// Drives one session through its phases.
pub struct OrchestrationController {
    extraction: ExtractionGateway,
    analysis: AnalysisGateway,
    state: SessionState,
    history: Vec<Phase>,
    listener: Option<PhaseListener>,
}

impl OrchestrationController {
    pub fn new(extraction: ExtractionGateway, analysis: AnalysisGateway) -> Self {
        Self {
            extraction,
            analysis,
            state: SessionState::default(),
            history: vec![Phase::Idle],
            listener: None,
        }
    }

    /// Get notified on every phase change (e.g. to update a progress display).
    pub fn with_phase_listener(mut self, listener: impl Fn(Phase) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.state.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.state.last_error.as_ref()
    }

    /// Every phase entered since the session was created, in order.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Enrichment of the current result, if any.
    pub fn enrichment(&self, top_n: usize) -> Option<Enrichment> {
        self.state
            .result
            .as_ref()
            .map(|r| enrichment::enrich_with(r, top_n))
    }

    /// Start a first pass for `request`.
    ///
    /// Returns the phase the session settled in (`Presenting` or `Errored`).
    /// Extraction and analysis failures are not `Err`: they land in
    /// `Errored` with an [`ErrorRecord`].
    pub async fn run(&mut self, request: FeatureRequest) -> Result<Phase, RequestError> {
        if !request.is_submittable() {
            return Err(RequestError::EmptyRequest);
        }

        info!(
            "Starting analysis for \"{}\"{}",
            request.title.as_deref().unwrap_or("untitled"),
            if request.attached_file.is_some() {
                " with attachment"
            } else {
                ""
            }
        );

        self.state.request = Some(request);
        self.state.result = None;
        self.state.last_input = None;
        self.state.last_attempt = Some(Attempt::Run);
        Ok(self.execute_run().await)
    }

    /// Re-analyze the presented result with clarification notes.
    ///
    /// The attachment is never extracted again: the cached extracted text is
    /// reused, or the last analyzed text when there was no attachment.
    pub async fn refine(&mut self, notes: &str) -> Result<Phase, RequestError> {
        if self.state.phase != Phase::Presenting {
            return Err(RequestError::InvalidPhase {
                action: "refine",
                phase: self.state.phase,
            });
        }
        if notes.trim().is_empty() {
            return Err(RequestError::EmptyNotes);
        }

        self.state.last_attempt = Some(Attempt::Refine {
            notes: notes.to_string(),
        });
        Ok(self.execute_refine(notes.to_string()).await)
    }

    /// Replay the last attempted transition with the same request and notes.
    ///
    /// Falls back to `Idle` when there is no request to replay.
    pub async fn retry(&mut self) -> Result<Phase, RequestError> {
        if self.state.request.is_none() {
            debug!("retry: no cached request, returning to idle");
            self.reset();
            return Ok(Phase::Idle);
        }
        if self.state.phase != Phase::Errored {
            return Err(RequestError::InvalidPhase {
                action: "retry",
                phase: self.state.phase,
            });
        }

        info!("Retrying last attempt");
        let phase = match self.state.last_attempt.clone() {
            Some(Attempt::Refine { notes }) => self.execute_refine(notes).await,
            Some(Attempt::Run) | None => self.execute_run().await,
        };
        Ok(phase)
    }

    /// Drop the attachment and go back to `Idle`, keeping the typed draft.
    ///
    /// This is the recovery path for extraction errors ("try another file",
    /// "paste text instead").
    pub fn discard_attachment(&mut self) -> Result<(), RequestError> {
        if self.state.phase.is_busy() || self.state.phase == Phase::Presenting {
            return Err(RequestError::InvalidPhase {
                action: "discard the attachment",
                phase: self.state.phase,
            });
        }
        if let Some(request) = self.state.request.as_mut() {
            request.attached_file = None;
        }
        self.state.extracted_text = None;
        self.state.last_error = None;
        self.enter(Phase::Idle);
        Ok(())
    }

    /// Forget everything and return to `Idle`.
    pub fn new_analysis(&mut self) {
        info!("Starting a new analysis session");
        self.reset();
    }

    fn reset(&mut self) {
        self.state = SessionState::default();
        self.enter(Phase::Idle);
    }

    /// First pass: extract if there is an attachment, then analyze.
    async fn execute_run(&mut self) -> Phase {
        let Some(request) = self.state.request.take() else {
            self.reset();
            return Phase::Idle;
        };

        self.state.last_error = None;
        self.state.extracted_text = None;
        let text = self.first_pass_text(&request).await;
        let input = text.map(|combined| AnalysisInput {
            combined_feature_text: combined,
            title: request.title.clone().unwrap_or_default(),
            context: request.context.clone().unwrap_or_default(),
            clarification_notes: None,
        });
        self.state.request = Some(request);

        match input {
            Ok(input) => self.execute_analysis(input).await,
            Err(failure) => {
                self.fail(ErrorOrigin::Extraction, failure.reason, None);
                self.state.phase
            }
        }
    }

    async fn first_pass_text(
        &mut self,
        request: &FeatureRequest,
    ) -> Result<String, ExtractionFailure> {
        let Some(file) = request.attached_file.as_ref() else {
            return Ok(request.feature_text.clone());
        };

        self.enter(Phase::Extracting);
        let extracted = self.extraction.extract(&file.bytes, &file.mime_type).await?;
        let combined = merge_feature_text(&request.feature_text, &extracted);
        self.state.extracted_text = Some(extracted);
        Ok(combined)
    }

    async fn execute_refine(&mut self, notes: String) -> Phase {
        let Some(request) = self.state.request.as_ref() else {
            self.reset();
            return Phase::Idle;
        };

        let text = match (&self.state.extracted_text, &self.state.last_input) {
            (Some(cached), _) => cached.as_str().to_string(),
            (None, Some(last)) => last.combined_feature_text.clone(),
            (None, None) => request.feature_text.clone(),
        };
        let input = AnalysisInput {
            combined_feature_text: text,
            title: request.title.clone().unwrap_or_default(),
            context: request.context.clone().unwrap_or_default(),
            clarification_notes: Some(notes),
        };

        self.state.last_error = None;
        self.execute_analysis(input).await
    }

    async fn execute_analysis(&mut self, input: AnalysisInput) -> Phase {
        self.enter(Phase::Analyzing);
        let outcome = self.analysis.analyze_structured(&input).await;
        self.state.last_input = Some(input);

        match outcome {
            Ok(result) => {
                info!(
                    "Analysis complete: {} UX problems, {} next actions",
                    result.predicted_ux_problems.len(),
                    result.next_actions.len()
                );
                self.state.result = Some(result);
                self.enter(Phase::Presenting);
            }
            Err(e) => {
                let raw = e.raw_payload().map(str::to_string);
                self.fail(ErrorOrigin::Analysis, e.to_string(), raw);
            }
        }
        self.state.phase
    }

    fn fail(&mut self, origin: ErrorOrigin, message: String, raw_payload: Option<String>) {
        warn!("{:?} failed: {}", origin, message);
        self.state.last_error = Some(ErrorRecord {
            origin,
            message,
            raw_payload,
        });
        self.enter(Phase::Errored);
    }

    fn enter(&mut self, phase: Phase) {
        if self.state.phase != phase {
            info!("Session phase: {} -> {}", self.state.phase, phase);
        }
        self.state.phase = phase;
        self.history.push(phase);
        if let Some(listener) = &self.listener {
            listener(phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockAnalysisService, MockExtractionService};
    use crate::llm::LlmError;
    use crate::models::{FileRef, UxProblem};
    use std::sync::{Arc, Mutex};

    fn valid_payload() -> String {
        serde_json::to_string(&AnalysisResult {
            executive_summary: "Clear enough".to_string(),
            ..AnalysisResult::default()
        })
        .unwrap()
    }

    fn controller(
        extraction: &Arc<MockExtractionService>,
        analysis: &Arc<MockAnalysisService>,
    ) -> OrchestrationController {
        OrchestrationController::new(
            ExtractionGateway::new(extraction.clone()),
            AnalysisGateway::new(analysis.clone(), 0.2),
        )
    }

    fn with_file(text: &str) -> FeatureRequest {
        FeatureRequest {
            title: Some("Checkout".to_string()),
            context: None,
            feature_text: text.to_string(),
            attached_file: Some(FileRef {
                name: "flow.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes: vec![137, 80, 78, 71],
            }),
        }
    }

    #[tokio::test]
    async fn test_text_only_skips_extraction() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        let phase = session
            .run(FeatureRequest::from_text("Bulk export of invoices"))
            .await
            .unwrap();

        assert_eq!(phase, Phase::Presenting);
        assert_eq!(
            session.history(),
            &[Phase::Idle, Phase::Analyzing, Phase::Presenting]
        );
        assert_eq!(extraction.call_count(), 0);
        assert_eq!(session.result().unwrap().executive_summary, "Clear enough");
        assert!(session.state().extracted_text.is_none());
    }

    #[tokio::test]
    async fn test_attachment_extracts_before_analyzing() {
        let extraction = Arc::new(MockExtractionService::returning("Step 1: pay"));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session.run(with_file("")).await.unwrap();

        assert_eq!(
            session.history(),
            &[
                Phase::Idle,
                Phase::Extracting,
                Phase::Analyzing,
                Phase::Presenting
            ]
        );
        assert_eq!(
            session.state().extracted_text.as_ref().unwrap().as_str(),
            "Step 1: pay"
        );
    }

    #[tokio::test]
    async fn test_blank_extraction_is_extraction_error() {
        let extraction = Arc::new(MockExtractionService::returning("  \n "));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        let phase = session.run(with_file("typed")).await.unwrap();

        assert_eq!(phase, Phase::Errored);
        assert_eq!(
            session.history(),
            &[Phase::Idle, Phase::Extracting, Phase::Errored]
        );
        let error = session.last_error().unwrap();
        assert!(error.is_extraction_origin());
        assert_eq!(error.raw_payload, None);
        assert_eq!(analysis.call_count(), 0);
    }

    #[tokio::test]
    async fn test_extraction_provider_error_is_extraction_error() {
        let extraction = Arc::new(MockExtractionService::new(vec![Err(LlmError::Connect(
            "http://localhost:11434".to_string(),
        ))]));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session.run(with_file("")).await.unwrap();

        let error = session.last_error().unwrap();
        assert_eq!(error.origin, ErrorOrigin::Extraction);
        assert!(error.message.contains("Cannot connect"));
    }

    #[tokio::test]
    async fn test_merge_typed_and_extracted() {
        let extraction = Arc::new(MockExtractionService::returning("B"));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session.run(with_file("A")).await.unwrap();

        let input = session.state().last_input.as_ref().unwrap();
        assert_eq!(
            input.combined_feature_text,
            "A\n\n--- Extracted from file ---\nB"
        );
        assert!(analysis.prompts()[0].contains("A\n\n--- Extracted from file ---\nB"));
    }

    #[test]
    fn test_merge_rule() {
        let b = ExtractedText::new("B").unwrap();
        assert_eq!(merge_feature_text("A", &b), "A\n\n--- Extracted from file ---\nB");
        assert_eq!(merge_feature_text("", &b), "B");
        assert_eq!(merge_feature_text("  \n", &b), "B");
    }

    #[tokio::test]
    async fn test_refine_reuses_cached_extraction() {
        let extraction = Arc::new(MockExtractionService::returning("Extracted spec"));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session.run(with_file("Typed")).await.unwrap();
        let phase = session.refine("Guests cannot check out").await.unwrap();

        assert_eq!(phase, Phase::Presenting);
        assert_eq!(extraction.call_count(), 1);
        assert_eq!(analysis.call_count(), 2);

        let prompts = analysis.prompts();
        assert!(prompts[1].contains("Extracted spec"));
        assert!(prompts[1]
            .contains("Clarification Notes from previous analysis:\nGuests cannot check out"));
        assert!(!prompts[0].contains("Clarification Notes"));
        assert_eq!(
            &session.history()[session.history().len() - 3..],
            &[Phase::Presenting, Phase::Analyzing, Phase::Presenting]
        );
    }

    #[tokio::test]
    async fn test_refine_without_attachment_reuses_last_text() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session
            .run(FeatureRequest::from_text("Share reports by link"))
            .await
            .unwrap();
        session.refine("Links are public").await.unwrap();

        let input = session.state().last_input.as_ref().unwrap();
        assert_eq!(input.combined_feature_text, "Share reports by link");
        assert_eq!(input.clarification_notes.as_deref(), Some("Links are public"));
        assert_eq!(extraction.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refine_requires_presenting_and_notes() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        assert_eq!(
            session.refine("notes").await,
            Err(RequestError::InvalidPhase {
                action: "refine",
                phase: Phase::Idle
            })
        );

        session.run(FeatureRequest::from_text("x")).await.unwrap();
        assert_eq!(session.refine("   ").await, Err(RequestError::EmptyNotes));
        assert_eq!(analysis.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::default());
        let mut session = controller(&extraction, &analysis);

        let err = session.run(FeatureRequest::from_text("  ")).await.unwrap_err();
        assert_eq!(err, RequestError::EmptyRequest);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(analysis.call_count(), 0);
    }

    #[tokio::test]
    async fn test_login_scenario_end_to_end() {
        let payload = serde_json::to_string(&AnalysisResult {
            executive_summary: "Reset flow is underspecified.".to_string(),
            predicted_ux_problems: vec![
                UxProblem {
                    problem: "Expired reset link".to_string(),
                    severity: "High".to_string(),
                    description: "Dead end after clicking an old link.".to_string(),
                },
                UxProblem {
                    problem: "No confirmation".to_string(),
                    severity: "High".to_string(),
                    description: "User does not know the email was sent.".to_string(),
                },
            ],
            ..AnalysisResult::default()
        })
        .unwrap();
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::returning(&payload));
        let mut session = controller(&extraction, &analysis);

        let request = FeatureRequest {
            title: Some("Login".to_string()),
            context: Some(String::new()),
            feature_text: "Users can reset their password via email.".to_string(),
            attached_file: None,
        };
        assert_eq!(session.run(request).await.unwrap(), Phase::Presenting);

        assert_eq!(analysis.call_count(), 1);
        let prompt = &analysis.prompts()[0];
        assert!(prompt.contains("Login"));
        assert!(prompt.contains("Users can reset their password via email."));
        assert!(prompt.contains("Product Context: Not provided"));

        let enrichment = session.enrichment(3).unwrap();
        assert_eq!(enrichment.total_items, 2);
        assert_eq!(enrichment.high_count, 2);
        assert_eq!(enrichment.ambiguity_score, enrichment::ambiguity_score(2, 2));
        assert_eq!(
            enrichment.rework_probability,
            enrichment::rework_probability(2, 2)
        );
        assert_eq!(enrichment.top_critical_risks.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_kept_verbatim() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::returning("not json"));
        let mut session = controller(&extraction, &analysis);

        let phase = session.run(FeatureRequest::from_text("x")).await.unwrap();

        assert_eq!(phase, Phase::Errored);
        let error = session.last_error().unwrap();
        assert_eq!(error.origin, ErrorOrigin::Analysis);
        assert_eq!(error.raw_payload.as_deref(), Some("not json"));
    }

    #[tokio::test]
    async fn test_schema_violation_is_analysis_error() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::returning(r#"{"executiveSummary": "x"}"#));
        let mut session = controller(&extraction, &analysis);

        session.run(FeatureRequest::from_text("x")).await.unwrap();

        let error = session.last_error().unwrap();
        assert!(!error.is_extraction_origin());
        assert!(error.message.contains("nextActions"));
        assert_eq!(error.raw_payload.as_deref(), Some(r#"{"executiveSummary": "x"}"#));
    }

    #[tokio::test]
    async fn test_retry_replays_first_pass() {
        let extraction = Arc::new(MockExtractionService::returning("B"));
        let analysis = Arc::new(MockAnalysisService::new(vec![
            Err(LlmError::Timeout(300)),
            Ok(Some(valid_payload())),
        ]));
        let mut session = controller(&extraction, &analysis);

        assert_eq!(session.run(with_file("A")).await.unwrap(), Phase::Errored);
        assert_eq!(session.last_error().unwrap().raw_payload, None);

        assert_eq!(session.retry().await.unwrap(), Phase::Presenting);
        assert!(session.last_error().is_none());
        assert_eq!(extraction.call_count(), 2);
        assert_eq!(analysis.prompts()[0], analysis.prompts()[1]);
    }

    #[tokio::test]
    async fn test_retry_replays_refinement_with_notes() {
        let extraction = Arc::new(MockExtractionService::returning("Spec"));
        let analysis = Arc::new(MockAnalysisService::new(vec![
            Ok(Some(valid_payload())),
            Ok(Some("{".to_string())),
            Ok(Some(valid_payload())),
        ]));
        let mut session = controller(&extraction, &analysis);

        session.run(with_file("")).await.unwrap();
        assert_eq!(session.refine("Only admins").await.unwrap(), Phase::Errored);
        assert_eq!(session.retry().await.unwrap(), Phase::Presenting);

        let prompts = analysis.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains("Only admins"));
        assert_eq!(extraction.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_without_request_falls_back_to_idle() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::default());
        let mut session = controller(&extraction, &analysis);

        assert_eq!(session.retry().await.unwrap(), Phase::Idle);
        assert_eq!(analysis.call_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_outside_errored_is_rejected() {
        let extraction = Arc::new(MockExtractionService::default());
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session.run(FeatureRequest::from_text("x")).await.unwrap();
        assert!(matches!(
            session.retry().await,
            Err(RequestError::InvalidPhase { .. })
        ));
    }

    #[tokio::test]
    async fn test_discard_attachment_keeps_draft() {
        let extraction = Arc::new(MockExtractionService::returning(""));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session.run(with_file("Typed draft")).await.unwrap();
        session.discard_attachment().unwrap();

        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.last_error().is_none());
        let draft = session.state().request.as_ref().unwrap();
        assert_eq!(draft.feature_text, "Typed draft");
        assert!(draft.attached_file.is_none());
    }

    #[tokio::test]
    async fn test_new_analysis_clears_session() {
        let extraction = Arc::new(MockExtractionService::returning("Spec"));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let mut session = controller(&extraction, &analysis);

        session.run(with_file("")).await.unwrap();
        session.new_analysis();

        let state = session.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.request.is_none());
        assert!(state.result.is_none());
        assert!(state.extracted_text.is_none());
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_phase_listener_sees_transitions() {
        let extraction = Arc::new(MockExtractionService::returning("Spec"));
        let analysis = Arc::new(MockAnalysisService::returning(&valid_payload()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_listener = seen.clone();
        let mut session = controller(&extraction, &analysis)
            .with_phase_listener(move |p| seen_in_listener.lock().unwrap().push(p));

        session.run(with_file("")).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Phase::Extracting, Phase::Analyzing, Phase::Presenting]
        );
    }
}
