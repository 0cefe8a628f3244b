//! Service error types with HTTP status code mapping.
//!
//! [`ForgeError`] is the central error type for the pipeline. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "no job found for token 42",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges below).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status               |
/// |-----------|-------------------|---------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request           |
/// | 2000–2999 | Not Found / State | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server / Upstream | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Job with the given ID was not found.
    #[error("job not found: {0}")]
    JobNotFound(crate::domain::JobId),

    /// No job exists for the given token ID.
    #[error("no job found for token {0}")]
    TokenNotFound(u64),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration is missing or invalid. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A job status transition that the state machine forbids.
    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition {
        /// Current job status.
        from: crate::domain::JobStatus,
        /// Attempted next status.
        to: crate::domain::JobStatus,
    },

    /// A second `process_job` call for a token that is already in flight.
    #[error("token {0} is already being processed")]
    AlreadyProcessing(u64),

    /// Trait generation could not produce a unique, cap-compliant
    /// combination within the retry tolerance.
    #[error("generation exhausted after {attempts} attempts: {reason}")]
    GenerationExhausted {
        /// Number of rejected draws before giving up.
        attempts: u32,
        /// Why draws kept being rejected.
        reason: String,
    },

    /// The asset renderer failed for a specific job.
    ///
    /// Carries the underlying message verbatim so it lands in `job.error`
    /// unmangled.
    #[error("{0}")]
    Render(String),

    /// The storage uploader failed for a specific job.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Chain RPC call or log query failed.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Contract read returned something unusable.
    #[error("contract call failed: {0}")]
    ContractCall(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Configuration(_) => 1002,
            Self::JobNotFound(_) => 2001,
            Self::TokenNotFound(_) => 2002,
            Self::InvalidTransition { .. } => 2003,
            Self::AlreadyProcessing(_) => 2004,
            Self::GenerationExhausted { .. } => 3001,
            Self::Render(_) => 3002,
            Self::Upload(_) => 3003,
            Self::Rpc(_) => 3004,
            Self::ContractCall(_) => 3005,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::JobNotFound(_) | Self::TokenNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } | Self::AlreadyProcessing(_) => StatusCode::CONFLICT,
            Self::Configuration(_)
            | Self::GenerationExhausted { .. }
            | Self::Render(_)
            | Self::Upload(_)
            | Self::Rpc(_)
            | Self::ContractCall(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::JobId;

    #[test]
    fn not_found_maps_to_404() {
        let err = ForgeError::TokenNotFound(42);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2002);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let err = ForgeError::InvalidRequest("tokenId must be numeric".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn render_error_keeps_message_verbatim() {
        let err = ForgeError::Render("disk full".to_string());
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn job_not_found_mentions_id() {
        let id = JobId::new();
        let err = ForgeError::JobNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
