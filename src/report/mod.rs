//! Clarity report rendering for the terminal front-end.

mod generator;

pub use generator::{
    generate_error_report, generate_json_report, generate_markdown_report, write_report,
};

use crate::enrichment::Enrichment;
use crate::models::AnalysisResult;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where and how a report was produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub feature_title: String,
    pub analysis_date: DateTime<Utc>,
    pub provider: String,
    pub model_used: String,
    /// Name of the attached file, if the feature came from one.
    pub source_file: Option<String>,
    /// Number of refinement passes applied to the result.
    pub refinements: usize,
    pub duration_seconds: f64,
}

/// A presented analysis with its enrichment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarityReport {
    pub metadata: ReportMetadata,
    pub result: AnalysisResult,
    pub enrichment: Enrichment,
}
