//! Data models for the clarity analyzer.
//!
//! This module contains the request-side types a session works with and
//! the fixed shape of the analysis result every consumer depends on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of a risk item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Low severity - cosmetic or unlikely to cause rework
    Low,
    /// Medium severity - needs a decision before design
    Medium,
    /// High severity - likely to break the feature or force rework
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

impl Severity {
    /// Parse a model-provided label. Unrecognized labels yield `None`,
    /// which consumers render as the neutral "Unrated" category.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }

    /// Numeric rank used by the enrichment heuristic (Low = 0).
    pub fn rank(self) -> i32 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
        }
    }

    /// Inverse of [`Severity::rank`], clamping out-of-range values.
    pub fn from_rank(rank: i32) -> Self {
        match rank {
            r if r <= 0 => Severity::Low,
            1 => Severity::Medium,
            _ => Severity::High,
        }
    }

    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🔴",
        }
    }
}

/// Derived likelihood of a risk item materializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Likelihood {
    Low,
    High,
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Likelihood::Low => write!(f, "Low"),
            Likelihood::High => write!(f, "High"),
        }
    }
}

/// A file attached to a feature request.
#[derive(Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Original file name (used for `.docx` detection and display).
    pub name: String,
    /// Declared media type, e.g. `image/png` or `application/pdf`.
    pub mime_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRef")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What the user submitted for analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureRequest {
    pub title: Option<String>,
    pub context: Option<String>,
    /// Typed feature description (may be blank when a file is attached).
    pub feature_text: String,
    pub attached_file: Option<FileRef>,
}

impl FeatureRequest {
    /// Creates a text-only request.
    pub fn from_text(feature_text: impl Into<String>) -> Self {
        Self {
            feature_text: feature_text.into(),
            ..Self::default()
        }
    }

    /// At least one of a non-blank description or an attachment is required.
    pub fn is_submittable(&self) -> bool {
        !self.feature_text.trim().is_empty() || self.attached_file.is_some()
    }
}

/// Everything the analysis gateway needs to build a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    pub combined_feature_text: String,
    pub title: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_notes: Option<String>,
}

/// Unstated beliefs that must hold for the feature to work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitAssumptions {
    pub behavioral: Vec<String>,
    pub technical: Vec<String>,
    pub business: Vec<String>,
    pub ux: Vec<String>,
}

/// Edge cases and structural risks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemRiskScenarios {
    pub failure_states: Vec<String>,
    pub permission_conflicts: Vec<String>,
    pub empty_data_scenarios: Vec<String>,
    pub concurrency_issues: Vec<String>,
    pub user_misuse_patterns: Vec<String>,
}

/// A UX problem predicted by the model, with its own severity label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UxProblem {
    pub problem: String,
    /// Passed through verbatim; see [`Severity::from_label`].
    pub severity: String,
    pub description: String,
}

/// The structured clarity report produced by the analysis capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub executive_summary: String,
    pub implicit_assumptions: ImplicitAssumptions,
    pub system_risk_scenarios: SystemRiskScenarios,
    pub predicted_ux_problems: Vec<UxProblem>,
    pub next_actions: Vec<String>,
}

impl ImplicitAssumptions {
    /// Categories in display order, with their labels.
    pub fn categories(&self) -> [(&'static str, &[String]); 4] {
        [
            ("Behavioral", self.behavioral.as_slice()),
            ("Technical", self.technical.as_slice()),
            ("Business", self.business.as_slice()),
            ("UX", self.ux.as_slice()),
        ]
    }
}

impl SystemRiskScenarios {
    /// Categories in display order, with their labels.
    pub fn categories(&self) -> [(&'static str, &[String]); 5] {
        [
            ("Failure States", self.failure_states.as_slice()),
            ("Permission Conflicts", self.permission_conflicts.as_slice()),
            ("Empty Data Scenarios", self.empty_data_scenarios.as_slice()),
            ("Concurrency Issues", self.concurrency_issues.as_slice()),
            ("User Misuse Patterns", self.user_misuse_patterns.as_slice()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_severity_from_label() {
        assert_eq!(Severity::from_label("High"), Some(Severity::High));
        assert_eq!(Severity::from_label(" medium "), Some(Severity::Medium));
        assert_eq!(Severity::from_label("LOW"), Some(Severity::Low));
        assert_eq!(Severity::from_label("Critical"), None);
        assert_eq!(Severity::from_label(""), None);
    }

    #[test]
    fn test_severity_rank_clamps() {
        assert_eq!(Severity::from_rank(-1), Severity::Low);
        assert_eq!(Severity::from_rank(1), Severity::Medium);
        assert_eq!(Severity::from_rank(7), Severity::High);
        for s in [Severity::Low, Severity::Medium, Severity::High] {
            assert_eq!(Severity::from_rank(s.rank()), s);
        }
    }

    #[test]
    fn test_request_submittable() {
        assert!(!FeatureRequest::default().is_submittable());
        assert!(!FeatureRequest::from_text("   \n").is_submittable());
        assert!(FeatureRequest::from_text("Export to CSV").is_submittable());

        let with_file = FeatureRequest {
            attached_file: Some(FileRef {
                name: "spec.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                bytes: vec![1, 2, 3],
            }),
            ..FeatureRequest::default()
        };
        assert!(with_file.is_submittable());
    }

    #[test]
    fn test_result_uses_camel_case_keys() {
        let json = serde_json::to_value(AnalysisResult::default()).unwrap();
        assert!(json.get("executiveSummary").is_some());
        assert!(json["systemRiskScenarios"].get("failureStates").is_some());
        assert!(json["implicitAssumptions"].get("ux").is_some());
    }

    #[test]
    fn test_file_ref_debug_hides_bytes() {
        let file = FileRef {
            name: "shot.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: vec![0; 2048],
        };
        let debug = format!("{:?}", file);
        assert!(debug.contains("len: 2048"));
        assert!(!debug.contains("[0, 0"));
    }
}
