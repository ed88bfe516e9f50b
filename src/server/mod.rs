//! HTTP boundary.
//!
//! Two stateless JSON endpoints in front of the gateways, used by a web
//! front-end that runs its own session:
//!
//! - `POST /api/extract` `{base64Data, mimeType}` -> `{text}`
//! - `POST /api/analyze` `{featureText, title?, context?, clarificationNotes?}`
//!   -> the analysis result
//!
//! Failures come back as `{error, rawResponse?}`.

use crate::analysis::AnalysisGateway;
use crate::extraction::ExtractionGateway;
use crate::models::{AnalysisInput, AnalysisResult};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gateways shared by all requests.
pub struct AppState {
    pub extraction: ExtractionGateway,
    pub analysis: AnalysisGateway,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    #[serde(default)]
    pub base64_data: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub feature_text: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub clarification_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(
    status: StatusCode,
    error: impl Into<String>,
    raw_response: Option<String>,
) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
            raw_response,
        }),
    )
}

/// Build the router with the configured body limit.
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/extract", post(extract))
        .route("/api/analyze", post(analyze))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, bind: &str, max_body_bytes: usize) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);
    axum::serve(listener, router(state, max_body_bytes))
        .await
        .context("HTTP server failed")
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Accepts raw base64 as well as a `data:<mime>;base64,` URL.
fn decode_base64(data: &str) -> Option<Vec<u8>> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn extract(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text(), None))?;

    let (Some(data), Some(mime_type)) = (
        non_blank(request.base64_data),
        non_blank(request.mime_type),
    ) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing base64Data or mimeType",
            None,
        ));
    };

    let bytes = decode_base64(&data).ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, "base64Data is not valid base64", None)
    })?;
    debug!(bytes = bytes.len(), mime_type = %mime_type, "POST /api/extract");

    match state.extraction.extract(&bytes, &mime_type).await {
        Ok(text) => Ok(Json(ExtractResponse {
            text: text.into_string(),
        })),
        Err(failure) => {
            warn!("Extraction request failed: {}", failure);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                failure.reason,
                None,
            ))
        }
    }
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Json(request) =
        payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text(), None))?;

    let Some(feature_text) = non_blank(request.feature_text) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing featureText", None));
    };
    debug!(chars = feature_text.len(), "POST /api/analyze");

    let input = AnalysisInput {
        combined_feature_text: feature_text,
        title: request.title.unwrap_or_default(),
        context: request.context.unwrap_or_default(),
        clarification_notes: non_blank(request.clarification_notes),
    };

    state
        .analysis
        .analyze_structured(&input)
        .await
        .map(Json)
        .map_err(|e| {
            warn!("Analysis request failed: {}", e);
            let raw = e.raw_payload().map(str::to_string);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), raw)
        })
}
