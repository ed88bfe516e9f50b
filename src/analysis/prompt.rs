//! Deterministic prompt construction for the analysis call.

use crate::models::AnalysisInput;

/// Placeholder used when the request has no title.
pub const UNTITLED_FEATURE: &str = "Untitled Feature";

/// Placeholder used when the request has no product context.
pub const CONTEXT_NOT_PROVIDED: &str = "Not provided";

/// Build the analysis prompt: title, context, description, and the
/// clarification notes block only when notes are present.
pub fn build_prompt(input: &AnalysisInput) -> String {
    let title = non_blank_or(&input.title, UNTITLED_FEATURE);
    let context = non_blank_or(&input.context, CONTEXT_NOT_PROVIDED);

    let mut prompt = String::new();
    prompt.push_str(
        "Analyze the following feature description for UX clarity, implicit assumptions, structural risks, and likely UX failures.\n\n",
    );
    prompt.push_str(&format!("Feature Title: {}\n", title));
    prompt.push_str(&format!("Product Context: {}\n\n", context));
    prompt.push_str("Feature Description:\n");
    prompt.push_str(&input.combined_feature_text);
    prompt.push('\n');

    if let Some(notes) = input
        .clarification_notes
        .as_deref()
        .filter(|n| !n.trim().is_empty())
    {
        prompt.push_str("\nClarification Notes from previous analysis:\n");
        prompt.push_str(notes);
        prompt.push('\n');
    }

    prompt
}

fn non_blank_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
