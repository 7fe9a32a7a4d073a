//! Event ingestion handler.
//!
//! Pulls the bearer credential and signature header off the request, runs
//! the pipeline, and maps the outcome to the response contract: stable
//! error codes, field-level validation details, and rate-limit headers on
//! every response that reached the rate-limiter stage.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ingate_core::{error::FieldError, models::RateDecision, GatewayError};
use ingate_pipeline::{IngestRejection, IngestRequest};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::AppState;

/// Header carrying the envelope signature.
pub const SIGNATURE_HEADER: &str = "x-ingate-signature";

/// Response from successful event ingestion.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Always true on the success path.
    pub success: bool,
    /// Server-assigned identifier for the committed event.
    pub event_id: String,
}

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message.
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable error code (E1001-E3003).
    pub code: String,
    /// Human-readable error description.
    pub message: String,
    /// Field-level failures, present for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Ingests one event through the full pipeline.
///
/// # Errors
///
/// Returns the contract's status codes: 401 for credential and signature
/// failures, 429 when rate limited, 400 for validation failures, 500 for
/// misconfiguration and commit failures.
#[instrument(name = "ingest_event", skip(state, headers, body))]
pub async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let credential = bearer_credential(&headers);
    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let request = IngestRequest { credential, signature_header, body };

    match state.pipeline.ingest(request).await {
        Ok(report) => {
            info!(event_id = %report.event_id, "event ingested");
            let mut response = (
                StatusCode::OK,
                Json(IngestResponse { success: true, event_id: report.event_id.to_string() }),
            )
                .into_response();
            apply_rate_headers(&mut response, report.rate);
            response
        },
        Err(rejection) => {
            warn!(code = rejection.error.code(), "event rejected");
            rejection_response(rejection)
        },
    }
}

fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(ToString::to_string)
}

fn rejection_response(rejection: IngestRejection) -> Response {
    let status = status_for(&rejection.error);
    let details = match &rejection.error {
        GatewayError::Validation { errors } => Some(errors.clone()),
        _ => None,
    };
    let detail = ErrorDetail {
        code: rejection.error.code().to_string(),
        message: rejection.error.to_string(),
        details,
    };

    let mut response = (status, Json(ErrorResponse { error: detail })).into_response();
    if let Some(rate) = rejection.rate {
        apply_rate_headers(&mut response, rate);
    }
    response
}

const fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::MissingCredential
        | GatewayError::InvalidCredential
        | GatewayError::MissingSignature
        | GatewayError::InvalidSignature => StatusCode::UNAUTHORIZED,
        GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
        GatewayError::Configuration(_) | GatewayError::Persist(_) | GatewayError::Publish(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

/// Sets the standard rate-limit headers; reset is epoch seconds.
fn apply_rate_headers(response: &mut Response, rate: RateDecision) {
    let headers = response.headers_mut();
    if let Ok(value) = rate.limit.to_string().parse() {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = rate.remaining.to_string().parse() {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = (rate.reset_at_ms / 1000).to_string().parse() {
        headers.insert("x-ratelimit-reset", value);
    }
}
