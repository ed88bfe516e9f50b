//! Markdown report generation.
//!
//! This module renders a presented analysis as a Markdown or JSON report,
//! and renders the error view when a session ends in `Errored`.

use super::{ClarityReport, ReportMetadata};
use crate::enrichment::{Enrichment, RiskItem};
use crate::models::{AnalysisResult, Severity, UxProblem};
use crate::session::{ErrorOrigin, ErrorRecord};
use anyhow::{Context, Result};
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ClarityReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!(
        "# Feature Clarity Report: {}\n\n",
        report.metadata.feature_title
    ));

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.result.executive_summary));
    output.push_str(&generate_metrics_section(&report.enrichment));
    output.push_str(&generate_critical_risks_section(
        &report.enrichment.top_critical_risks,
    ));
    output.push_str(&generate_assumptions_section(&report.result));
    output.push_str(&generate_risk_scenarios_section(&report.result));
    output.push_str(&generate_ux_problems_section(
        &report.result.predicted_ux_problems,
    ));
    output.push_str(&generate_next_actions_section(&report.result.next_actions));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Provider:** {} (`{}`)\n",
        metadata.provider, metadata.model_used
    ));
    if let Some(ref source) = metadata.source_file {
        section.push_str(&format!("- **Source File:** {}\n", source));
    }
    if metadata.refinements > 0 {
        section.push_str(&format!(
            "- **Refinement Passes:** {}\n",
            metadata.refinements
        ));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_summary_section(summary: &str) -> String {
    if summary.is_empty() {
        return String::new();
    }
    format!("## Executive Summary\n\n{}\n\n", summary)
}

/// Generate the metrics table.
fn generate_metrics_section(enrichment: &Enrichment) -> String {
    let mut section = String::new();

    section.push_str("## Clarity Metrics\n\n");
    section.push_str("| Ambiguity Score | Rework Probability | Items | High Severity |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {}/100 | {}% | {} | {} |\n\n",
        enrichment.ambiguity_score,
        enrichment.rework_probability,
        enrichment.total_items,
        enrichment.high_count
    ));

    section
}

fn generate_critical_risks_section(risks: &[RiskItem]) -> String {
    if risks.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Top Critical Risks\n\n");
    for (i, risk) in risks.iter().enumerate() {
        section.push_str(&format!(
            "{}. {} **{}** ({}, likelihood {})\n",
            i + 1,
            severity_badge(risk.severity),
            risk.title,
            risk.category,
            risk.likelihood
        ));
    }
    section.push('\n');

    section
}

fn generate_assumptions_section(result: &AnalysisResult) -> String {
    let mut section = String::from("## Implicit Assumptions\n\n");
    for (label, items) in result.implicit_assumptions.categories() {
        section.push_str(&generate_category_list(label, items));
    }
    section
}

fn generate_risk_scenarios_section(result: &AnalysisResult) -> String {
    let mut section = String::from("## System Risk Scenarios\n\n");
    for (label, items) in result.system_risk_scenarios.categories() {
        section.push_str(&generate_category_list(label, items));
    }
    section
}

/// One category heading and its bullet list. Empty categories are kept so
/// the reader sees they were considered.
fn generate_category_list(label: &str, items: &[String]) -> String {
    let mut block = format!("### {}\n\n", label);
    if items.is_empty() {
        block.push_str("_None identified._\n\n");
        return block;
    }
    for item in items {
        block.push_str(&format!("- {}\n", item));
    }
    block.push('\n');
    block
}

/// Generate the predicted UX problems section.
fn generate_ux_problems_section(problems: &[UxProblem]) -> String {
    let mut section = String::from("## Predicted UX Problems\n\n");

    if problems.is_empty() {
        section.push_str("No UX problems were predicted.\n\n");
        return section;
    }

    for problem in problems {
        section.push_str(&generate_ux_problem_block(problem));
    }

    section
}

/// Generate a single UX problem block.
fn generate_ux_problem_block(problem: &UxProblem) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {} {}\n\n",
        severity_badge(Severity::from_label(&problem.severity)),
        problem.problem
    ));
    if !problem.description.is_empty() {
        block.push_str(&format!("{}\n\n", problem.description));
    }
    block.push_str("---\n\n");

    block
}

/// Generate the next actions section.
fn generate_next_actions_section(actions: &[String]) -> String {
    if actions.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Next Actions\n\n");
    for (i, action) in actions.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, action));
    }
    section.push('\n');

    section
}

fn severity_badge(severity: Option<Severity>) -> String {
    match severity {
        Some(s) => format!("{} **{}**", s.emoji(), s.to_string().to_uppercase()),
        None => "⚪ **UNRATED**".to_string(),
    }
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by Clarifier*\n".to_string()
}

/// Render the error view: the message, the recovery options, and the raw
/// model payload when one was kept.
pub fn generate_error_report(error: &ErrorRecord) -> String {
    let mut output = String::new();

    let heading = match error.origin {
        ErrorOrigin::Extraction => "Text extraction failed",
        ErrorOrigin::Analysis => "Analysis failed",
    };
    output.push_str(&format!("❌ {}: {}\n", heading, error.message));

    if error.is_extraction_origin() {
        output.push_str("   Retry, try another file, or paste the feature text instead (--text).\n");
    } else {
        output.push_str("   You can retry the analysis with the same input.\n");
    }

    if let Some(ref raw) = error.raw_payload {
        output.push_str("\nRaw model response:\n```\n");
        output.push_str(raw);
        if !raw.ends_with('\n') {
            output.push('\n');
        }
        output.push_str("```\n");
    }

    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ClarityReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
