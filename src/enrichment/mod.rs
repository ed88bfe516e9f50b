//! Display-oriented enrichment of an analysis result.
//!
//! Assumptions and risk scenarios carry no severity from the model, so one
//! is derived here from the category's base severity and the item's text
//! length and position. The derivation is a ranking heuristic for display,
//! and it is fully deterministic: the same result always enriches the same
//! way.

use crate::models::{AnalysisResult, Likelihood, Severity};
use serde::Serialize;

/// How many critical risks are highlighted by default.
pub const TOP_CRITICAL_RISKS: usize = 3;

/// Where an enriched item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Section {
    Assumption,
    RiskScenario,
    UxProblem,
}

/// One item of the report with severity and likelihood attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskItem {
    pub section: Section,
    /// Display label of the category, e.g. "Failure States".
    pub category: &'static str,
    pub title: String,
    pub detail: Option<String>,
    /// `None` when the model's label was not Low/Medium/High.
    pub severity: Option<Severity>,
    pub likelihood: Likelihood,
    /// Whether the severity came from the model rather than the heuristic.
    pub native_severity: bool,
}

/// Enriched view of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    /// Every item, ranked by severity; ties keep category order.
    pub ranked: Vec<RiskItem>,
    pub top_critical_risks: Vec<RiskItem>,
    pub total_items: usize,
    pub high_count: usize,
    /// 0-100, higher means the description leaves more open.
    pub ambiguity_score: u32,
    /// 0-95 percent.
    pub rework_probability: u32,
}

/// Base severity of each assumption category.
const ASSUMPTION_BASE: [Severity; 4] = [
    Severity::Medium, // behavioral
    Severity::High,   // technical
    Severity::Low,    // business
    Severity::Medium, // ux
];

/// Base severity of each risk-scenario category.
const RISK_BASE: [Severity; 5] = [
    Severity::High,   // failure states
    Severity::High,   // permission conflicts
    Severity::Medium, // empty data
    Severity::High,   // concurrency
    Severity::Medium, // user misuse
];

/// Severity derived from the category base, nudged by text length and
/// position by one step at most.
pub fn derive_severity(base: Severity, text: &str, index: usize) -> Severity {
    let nudge = ((text.chars().count() + index) % 3) as i32 - 1;
    Severity::from_rank(base.rank() + nudge)
}

/// Likelihood derived from text length and position.
pub fn derive_likelihood(text: &str, index: usize) -> Likelihood {
    if (text.chars().count() + index) % 2 == 0 {
        Likelihood::High
    } else {
        Likelihood::Low
    }
}

/// `min(100, 3 * total + 10 * high)`
pub fn ambiguity_score(total_items: usize, high_count: usize) -> u32 {
    (3 * total_items + 10 * high_count).min(100) as u32
}

/// `min(95, 10 + 15 * high + 2 * total)`
pub fn rework_probability(total_items: usize, high_count: usize) -> u32 {
    (10 + 15 * high_count + 2 * total_items).min(95) as u32
}

/// Flatten all categories in their fixed order with severity attached.
pub fn collect_items(result: &AnalysisResult) -> Vec<RiskItem> {
    let mut items = Vec::new();

    let derived = result
        .implicit_assumptions
        .categories()
        .into_iter()
        .zip(ASSUMPTION_BASE)
        .map(|(category, base)| (Section::Assumption, category, base))
        .chain(
            result
                .system_risk_scenarios
                .categories()
                .into_iter()
                .zip(RISK_BASE)
                .map(|(category, base)| (Section::RiskScenario, category, base)),
        );

    for (section, (label, entries), base) in derived {
        for (index, text) in entries.iter().enumerate() {
            items.push(RiskItem {
                section,
                category: label,
                title: text.clone(),
                detail: None,
                severity: Some(derive_severity(base, text, index)),
                likelihood: derive_likelihood(text, index),
                native_severity: false,
            });
        }
    }

    for (index, problem) in result.predicted_ux_problems.iter().enumerate() {
        items.push(RiskItem {
            section: Section::UxProblem,
            category: "Predicted UX Problems",
            title: problem.problem.clone(),
            detail: Some(problem.description.clone()).filter(|d| !d.is_empty()),
            severity: Severity::from_label(&problem.severity),
            likelihood: derive_likelihood(&problem.problem, index),
            native_severity: true,
        });
    }

    items
}

/// Enrich a result, highlighting the first `top_n` High items.
pub fn enrich_with(result: &AnalysisResult, top_n: usize) -> Enrichment {
    let mut ranked = collect_items(result);
    let total_items = ranked.len();
    let high_count = ranked
        .iter()
        .filter(|i| i.severity == Some(Severity::High))
        .count();

    // Stable: equal severities keep category order. Unrated sorts last.
    ranked.sort_by_key(|i| std::cmp::Reverse(i.severity.map(|s| s.rank() + 1).unwrap_or(0)));

    let top_critical_risks = ranked
        .iter()
        .filter(|i| i.severity == Some(Severity::High))
        .take(top_n)
        .cloned()
        .collect();

    Enrichment {
        ranked,
        top_critical_risks,
        total_items,
        high_count,
        ambiguity_score: ambiguity_score(total_items, high_count),
        rework_probability: rework_probability(total_items, high_count),
    }
}

/// Enrich a result with the default number of top risks.
#[cfg(test)]
pub fn enrich(result: &AnalysisResult) -> Enrichment {
    enrich_with(result, TOP_CRITICAL_RISKS)
}
