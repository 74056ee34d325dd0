//! HTTP request handlers for the variant API.
//!
//! # Endpoints
//!
//! - `GET|HEAD /{source path}/{operations}` - Serve a variant
//! - `POST /events/upload` - Warm the variant matrix for uploaded sources
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{IoError, VariantError};
use crate::variant::policy::REDIRECT_CACHE_CONTROL;
use crate::variant::{
    ensure_read_method, UploadEvent, VariantKey, VariantOutcome, VariantService, WarmCache,
    WarmReport,
};

use super::signature::{EventSigner, SIGNATURE_HEADER};

/// Response header reporting where a record came from.
pub const VARIANT_CACHE_HEADER: &str = "x-variant-cache";

/// Entire body of a 403 for an oversized variant that could not be stored.
pub const TOO_LARGE_MESSAGE: &str = "Variant exceeds the response size limit";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// On-demand variant orchestrator
    pub service: Arc<VariantService>,

    /// Upload-time fan-out; the webhook is disabled without it
    pub warm: Option<Arc<WarmCache>>,

    /// Verifies webhook bodies when set
    pub signer: Option<EventSigner>,
}

impl AppState {
    pub fn new(service: Arc<VariantService>) -> Self {
        Self {
            service,
            warm: None,
            signer: None,
        }
    }

    pub fn with_warm_cache(mut self, warm: Arc<WarmCache>) -> Self {
        self.warm = Some(warm);
        self
    }

    pub fn with_signer(mut self, signer: EventSigner) -> Self {
        self.signer = Some(signer);
        self
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (for reference)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Webhook response: one report per warmed source plus failed events.
#[derive(Debug, Serialize)]
pub struct UploadEventResponse {
    pub reports: Vec<WarmReport>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ErrorResponse>,
}

// =============================================================================
// Error Handling
// =============================================================================

/// Status and error type for a variant error.
fn classify(err: &VariantError) -> (StatusCode, &'static str) {
    match err {
        VariantError::MethodNotAllowed { .. } => {
            (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed")
        }
        VariantError::MalformedKey { .. } => (StatusCode::BAD_REQUEST, "malformed_key"),
        VariantError::OriginFetch {
            source: IoError::NotFound(_),
            ..
        } => (StatusCode::INTERNAL_SERVER_ERROR, "source_not_found"),
        VariantError::OriginFetch { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "source_fetch_failed")
        }
        VariantError::Transform(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transform_failed"),
        VariantError::UnknownLocation { .. } => (StatusCode::BAD_REQUEST, "unknown_location"),
    }
}

fn log_error(status: StatusCode, error_type: &str, message: &str) {
    if status.is_server_error() {
        error!(error_type, status = status.as_u16(), "Request failed: {}", message);
    } else if status == StatusCode::NOT_FOUND {
        debug!(error_type, status = status.as_u16(), "Not found: {}", message);
    } else {
        warn!(error_type, status = status.as_u16(), "Client error: {}", message);
    }
}

impl IntoResponse for VariantError {
    fn into_response(self) -> Response {
        let (status, error_type) = classify(&self);
        let message = self.to_string();
        log_error(status, error_type, &message);

        let mut response =
            (status, Json(ErrorResponse::with_status(error_type, message, status))).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response.headers_mut().insert(
                header::ALLOW,
                header::HeaderValue::from_static("GET, HEAD"),
            );
        }
        response
    }
}

/// Finish a builder, falling back to a bare 500 if a header was invalid.
fn finish(builder: axum::http::response::Builder, body: Body) -> Response {
    match builder.body(body) {
        Ok(response) => response,
        Err(e) => {
            let message = format!("Failed to build response: {}", e);
            log_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", &message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_error", message)),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle variant requests.
///
/// The path is expected to be canonical already (see
/// [`edge_normalize`](super::edge::edge_normalize)): the last segment is the
/// operation set and everything before it is the source path.
///
/// # Response
///
/// - 200 with the variant bytes, `ETag`, `X-Variant-Cache` and, when
///   computed, `Server-Timing`
/// - 302 to the stored copy when the variant is too large to inline
/// - 403 when it is too large and could not be stored
pub async fn variant_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Result<Response, VariantError> {
    ensure_read_method(&method)?;

    let key = VariantKey::from_uri_path(uri.path(), state.service.policy().max_width)?;
    let outcome = state.service.serve(&method, &key).await?;

    let response = match outcome {
        VariantOutcome::Ok {
            record,
            timing,
            cache,
        } => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, record.content_type.as_str())
                .header(header::CONTENT_LENGTH, record.len())
                .header(header::CACHE_CONTROL, record.cache_control.as_str())
                .header(header::ETAG, record.etag())
                .header(VARIANT_CACHE_HEADER, cache.as_str());
            if let Some(timing) = timing {
                builder = builder.header("server-timing", timing.header_value());
            }

            let body = if method == Method::HEAD {
                Body::empty()
            } else {
                Body::from(record.bytes)
            };
            finish(builder, body)
        }

        VariantOutcome::Redirect { location, timing } => {
            debug!(key = %key, location = %location, "Redirecting to stored variant");
            let builder = Response::builder()
                .status(StatusCode::FOUND)
                .header(header::LOCATION, location)
                .header(header::CACHE_CONTROL, REDIRECT_CACHE_CONTROL)
                .header("server-timing", timing.header_value());
            finish(builder, Body::empty())
        }

        VariantOutcome::TooLarge { size, limit } => {
            warn!(key = %key, size, limit, "Variant too large to serve");
            let builder = Response::builder()
                .status(StatusCode::FORBIDDEN)
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .header(header::CACHE_CONTROL, REDIRECT_CACHE_CONTROL);
            finish(builder, Body::from(TOO_LARGE_MESSAGE))
        }
    };

    Ok(response)
}

/// Handle upload notifications by warming the variant matrix.
///
/// Events are warmed one after another; each source fans out its cells
/// concurrently. Responds 200 when every event was warmed without a fatal
/// cell, otherwise with the most severe status seen.
pub async fn upload_event_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(signer) = &state.signer {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Err(e) = signer.verify(signature, &body) {
            return e.into_response();
        }
    }

    let Some(warm) = &state.warm else {
        let status = StatusCode::SERVICE_UNAVAILABLE;
        let message = "Warm cache requires a variant store";
        log_error(status, "warm_cache_disabled", message);
        return (
            status,
            Json(ErrorResponse::with_status("warm_cache_disabled", message, status)),
        )
            .into_response();
    };

    let events = match UploadEvent::parse_document(&body) {
        Ok(events) => events,
        Err(e) => {
            let status = StatusCode::BAD_REQUEST;
            let message = format!("Invalid upload event: {}", e);
            log_error(status, "invalid_event", &message);
            return (
                status,
                Json(ErrorResponse::with_status("invalid_event", message, status)),
            )
                .into_response();
        }
    };

    let mut status = StatusCode::OK;
    let mut reports = Vec::with_capacity(events.len());
    let mut failures = Vec::new();

    for event in &events {
        match warm.warm(event).await {
            Ok(report) => {
                if !report.is_success() && status == StatusCode::OK {
                    status = StatusCode::INTERNAL_SERVER_ERROR;
                }
                reports.push(report);
            }
            Err(e) => {
                let (error_status, error_type) = classify(&e);
                let message = e.to_string();
                log_error(error_status, error_type, &message);
                if error_status.as_u16() > status.as_u16() {
                    status = error_status;
                }
                failures.push(ErrorResponse::with_status(error_type, message, error_status));
            }
        }
    }

    (status, Json(UploadEventResponse { reports, failures })).into_response()
}

/// Health check endpoint.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
