//! Response contract for the analysis model.
//!
//! Defines the fixed JSON shape of [`AnalysisResult`], the schema handed to
//! the model for constrained generation, and the deterministic parser that
//! turns a raw payload back into a typed result. The raw payload is kept on
//! every failure so it can be shown to the user.

use crate::models::AnalysisResult;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// Top-level keys every analysis payload must carry.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "executiveSummary",
    "implicitAssumptions",
    "systemRiskScenarios",
    "predictedUxProblems",
    "nextActions",
];

const ASSUMPTION_KEYS: [&str; 4] = ["behavioral", "technical", "business", "ux"];

const RISK_KEYS: [&str; 5] = [
    "failureStates",
    "permissionConflicts",
    "emptyDataScenarios",
    "concurrencyIssues",
    "userMisusePatterns",
];

/// Failure to turn a model payload into an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The payload is not valid JSON at all.
    #[error("Failed to parse JSON response from the analysis model: {detail}")]
    MalformedJson { raw_payload: String, detail: String },

    /// The payload is JSON but does not match the result shape.
    #[error("{}", describe_violation(.missing_fields, .detail))]
    SchemaViolation {
        raw_payload: String,
        missing_fields: Vec<String>,
        detail: Option<String>,
    },
}

impl ParseError {
    /// The payload exactly as the model returned it.
    pub fn raw_payload(&self) -> &str {
        match self {
            ParseError::MalformedJson { raw_payload, .. } => raw_payload,
            ParseError::SchemaViolation { raw_payload, .. } => raw_payload,
        }
    }
}

fn describe_violation(missing_fields: &[String], detail: &Option<String>) -> String {
    match (missing_fields.is_empty(), detail) {
        (false, _) => format!(
            "Analysis response is missing required fields: {}",
            missing_fields.join(", ")
        ),
        (true, Some(detail)) => format!("Analysis response does not match the schema: {}", detail),
        (true, None) => "Analysis response does not match the schema".to_string(),
    }
}

/// Parse a raw model payload into an [`AnalysisResult`].
///
/// Only the structure is checked. Content is not interpreted, so severity
/// labels outside Low/Medium/High are passed through untouched.
pub fn parse(raw: &str) -> Result<AnalysisResult, ParseError> {
    let body = strip_code_fence(raw);

    let value: Value = serde_json::from_str(body).map_err(|e| ParseError::MalformedJson {
        raw_payload: raw.to_string(),
        detail: e.to_string(),
    })?;

    let missing = missing_fields(&value);
    if !missing.is_empty() {
        debug!(?missing, "parse: schema violation");
        return Err(ParseError::SchemaViolation {
            raw_payload: raw.to_string(),
            missing_fields: missing,
            detail: None,
        });
    }

    serde_json::from_value(value).map_err(|e| ParseError::SchemaViolation {
        raw_payload: raw.to_string(),
        missing_fields: Vec::new(),
        detail: Some(e.to_string()),
    })
}

/// List required keys absent from a payload, nested ones as dotted paths.
///
/// A key holding `null` counts as absent.
pub fn missing_fields(value: &Value) -> Vec<String> {
    let Some(object) = value.as_object() else {
        return REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect();
    };

    let present = |obj: &serde_json::Map<String, Value>, key: &str| {
        obj.get(key).is_some_and(|v| !v.is_null())
    };

    let mut missing = Vec::new();
    for field in REQUIRED_FIELDS {
        if !present(object, field) {
            missing.push(field.to_string());
        }
    }

    for (parent, keys) in [
        ("implicitAssumptions", &ASSUMPTION_KEYS[..]),
        ("systemRiskScenarios", &RISK_KEYS[..]),
    ] {
        if let Some(nested) = object.get(parent).and_then(Value::as_object) {
            for key in keys {
                if !present(nested, *key) {
                    missing.push(format!("{}.{}", parent, key));
                }
            }
        }
    }

    missing
}

/// Unwrap a payload the model fenced as a Markdown code block.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// JSON schema describing [`AnalysisResult`], for schema-constrained generation.
pub fn response_schema() -> Value {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });

    let object_of_lists = |keys: &[&str]| {
        let properties: serde_json::Map<String, Value> = keys
            .iter()
            .map(|k| (k.to_string(), string_list.clone()))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": keys,
            "additionalProperties": false,
        })
    };

    json!({
        "type": "object",
        "properties": {
            "executiveSummary": {
                "type": "string",
                "description": "A short summary of the feature's clarity and overall risk level."
            },
            "implicitAssumptions": object_of_lists(&ASSUMPTION_KEYS[..]),
            "systemRiskScenarios": object_of_lists(&RISK_KEYS[..]),
            "predictedUxProblems": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "problem": { "type": "string" },
                        "severity": { "type": "string", "description": "Low, Medium, or High" },
                        "description": { "type": "string" }
                    },
                    "required": ["problem", "severity", "description"],
                    "additionalProperties": false
                }
            },
            "nextActions": string_list.clone(),
        },
        "required": REQUIRED_FIELDS,
        "additionalProperties": false,
    })
}
