//! Intercom service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Bridge
//! failures are logged server-side with full detail; the client sees a stable
//! error code plus a message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Intercom service error type.
///
/// Maps to HTTP status codes:
/// - BridgeUnreachable, ConfigureRejected: 502 Bad Gateway
/// - Negotiation, BadRequest: 400 Bad Request
/// - SessionNotFound: 410 Gone
/// - LineNotFound, ProductionNotFound: 404 Not Found
/// - Store, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum IntercomError {
    /// Network failure or non-2xx on an allocation call.
    #[error("Media bridge unreachable: {0}")]
    BridgeUnreachable(String),

    /// The bridge refused a configure request. Carries the bridge's own body.
    #[error("Endpoint configuration rejected: {0}")]
    ConfigureRejected(String),

    /// Client SDP is malformed or lacks required fields.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Line not found: {0}")]
    LineNotFound(String),

    #[error("Production not found: {0}")]
    ProductionNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Production store failure (only reachable with an external store).
    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal server error")]
    Internal,
}

impl IntercomError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            IntercomError::BridgeUnreachable(_) | IntercomError::ConfigureRejected(_) => 502,
            IntercomError::Negotiation(_) | IntercomError::BadRequest(_) => 400,
            IntercomError::SessionNotFound(_) => 410,
            IntercomError::LineNotFound(_) | IntercomError::ProductionNotFound(_) => 404,
            IntercomError::Store(_) | IntercomError::Internal => 500,
        }
    }

    /// Short, bounded label used for metrics and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            IntercomError::BridgeUnreachable(_) => "BRIDGE_UNREACHABLE",
            IntercomError::ConfigureRejected(_) => "CONFIGURE_REJECTED",
            IntercomError::Negotiation(_) => "NEGOTIATION_ERROR",
            IntercomError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            IntercomError::LineNotFound(_) => "LINE_NOT_FOUND",
            IntercomError::ProductionNotFound(_) => "PRODUCTION_NOT_FOUND",
            IntercomError::BadRequest(_) => "BAD_REQUEST",
            IntercomError::Store(_) => "STORE_ERROR",
            IntercomError::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for IntercomError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            IntercomError::BridgeUnreachable(detail) => {
                tracing::warn!(target: "intercom.bridge", detail = %detail, "Bridge unreachable");
                "Media bridge is unavailable".to_string()
            }
            IntercomError::ConfigureRejected(detail) => {
                tracing::warn!(target: "intercom.bridge", detail = %detail, "Bridge rejected configuration");
                format!("Media bridge rejected endpoint configuration: {detail}")
            }
            IntercomError::Store(detail) => {
                tracing::error!(target: "intercom.directory", error = %detail, "Store operation failed");
                "An internal storage error occurred".to_string()
            }
            IntercomError::Negotiation(reason)
            | IntercomError::BadRequest(reason)
            | IntercomError::SessionNotFound(reason)
            | IntercomError::LineNotFound(reason)
            | IntercomError::ProductionNotFound(reason) => reason.clone(),
            IntercomError::Internal => "An internal error occurred".to_string(),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}
