//! HTTP request handlers for the conversion API.
//!
//! # Endpoints
//!
//! - `GET /convert?source=...` - Convert (or serve the cached rendition of) a video
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::cache::{ObjectStore, SourceProbe};
use crate::error::{GatewayError, StorageError, TranscodeError};
use crate::service::ConversionService;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the conversion service.
pub struct AppState<O: ObjectStore, P: SourceProbe> {
    pub service: Arc<ConversionService<O, P>>,
}

impl<O: ObjectStore, P: SourceProbe> AppState<O, P> {
    pub fn new(service: ConversionService<O, P>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl<O: ObjectStore, P: SourceProbe> Clone for AppState<O, P> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert GatewayError to HTTP response.
///
/// Bodies are plain text. Transcoder diagnostics are logged but never sent to
/// the client.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            GatewayError::Query(e) => (
                StatusCode::BAD_REQUEST,
                "invalid_parameter",
                e.message().to_string(),
            ),

            GatewayError::Transcode(TranscodeError::SourceNotFound) => (
                StatusCode::BAD_REQUEST,
                "source_not_found",
                TranscodeError::SourceNotFound.public_message().to_string(),
            ),

            GatewayError::Transcode(e) => {
                if let TranscodeError::Failed { diagnostics, .. } = e {
                    debug!(diagnostics = %diagnostics, "Transcoder diagnostics");
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "transcode_error",
                    e.public_message().to_string(),
                )
            }

            GatewayError::Range { error, .. } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                "invalid_range",
                error.to_string(),
            ),

            GatewayError::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                match e {
                    StorageError::Connection(_) => "connection_error",
                    _ => "storage_error",
                },
                "Could not read the cached rendition.".to_string(),
            ),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                self
            );
        } else if status == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Range not satisfiable: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if let GatewayError::Range { length, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", length)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }

        (status, headers, message).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle conversion requests.
///
/// # Endpoint
///
/// `GET /convert?source=...&size=...&trim=...&format=...&fps=...&quality=...&keyframe=...`
///
/// # Response
///
/// - 200 with the streamed rendition, or 206 for a true `Range` request
/// - 400 for invalid parameters or an inaccessible source
/// - 416 for ranges that cannot be satisfied
/// - 500 if conversion or storage fails
pub async fn convert_handler<O, P>(
    State(state): State<AppState<O, P>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, GatewayError>
where
    O: ObjectStore,
    P: SourceProbe,
{
    let range = headers
        .get(header::RANGE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    state
        .service
        .convert(query.as_deref().unwrap_or_default(), range.as_deref())
        .await
}

/// `HEAD /convert`.
///
/// Answered with 405 so that a HEAD request never starts a conversion.
pub async fn convert_head_handler() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, HeaderValue::from_static("GET"))],
    )
        .into_response()
}

/// Health check endpoint.
///
/// Returns 200 OK with service status and version.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
