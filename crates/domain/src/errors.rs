//! Domain error types with HTTP status code mappings.
//!
//! Each variant is one of the named error kinds from the error-handling
//! design: `Validation`, `Unauthorized`, `Forbidden`, `QuotaExhausted`,
//! `NotFound`, `StateConflict`, `Transient`, `Fatal`, plus a catch-all
//! `Database`/`Internal` used before a raw error is classified.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}

/// Domain errors with HTTP status code mappings.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Validation error (400 Bad Request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Multiple validation errors (400 Bad Request)
    #[error("Validation failed")]
    ValidationErrors(Vec<String>),

    /// Invalid or missing credential (401 Unauthorized)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Feature unavailable on caller's tier (403 Forbidden)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// `reserve` denied the request (429 Too Many Requests)
    #[error("Quota exhausted")]
    QuotaExhausted {
        used: i64,
        limit: i64,
        resets_at: DateTime<Utc>,
    },

    /// Resource not found (404 Not Found)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Session already completed/expired/being completed (409 Conflict)
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Store unavailable or transaction conflict past retry budget (503)
    #[error("Transient failure, retry safe: {0}")]
    Transient(String),

    /// Invariant violated; logged with full context, generic message surfaced (500)
    #[error("Invariant violated: {0}")]
    Fatal(String),

    /// Database error not yet classified as transient (500)
    #[error("Database error")]
    Database(String),

    /// Internal server error (500 Internal Server Error)
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DomainError::Validation(_) | DomainError::ValidationErrors(_) => {
                StatusCode::BAD_REQUEST
            }
            DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
            DomainError::QuotaExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::StateConflict(_) => StatusCode::CONFLICT,
            DomainError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::Fatal(_) | DomainError::Database(_) | DomainError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) | DomainError::ValidationErrors(_) => "VALIDATION",
            DomainError::Unauthorized(_) => "AUTH",
            DomainError::Forbidden(_) => "TIER_DENIED",
            DomainError::QuotaExhausted { .. } => "QUOTA_EXHAUSTED",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::StateConflict(_) => "STATE_CONFLICT",
            DomainError::Transient(_) => "TRANSIENT",
            DomainError::Fatal(_) | DomainError::Database(_) | DomainError::Internal(_) => {
                "FATAL"
            }
        }
    }

    /// Create a validation error from validator errors
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error
                            .message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("validation failed"))
                    )
                })
            })
            .collect();

        if messages.is_empty() {
            DomainError::Validation("Invalid input".to_string())
        } else {
            DomainError::ValidationErrors(messages)
        }
    }
}

/// Implement IntoResponse for DomainError to integrate with Axum
impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log internal/fatal errors with full context; validation/auth/etc. are not errors.
        if matches!(
            self,
            DomainError::Fatal(_) | DomainError::Database(_) | DomainError::Internal(_)
        ) {
            tracing::error!("internal error: {}", self);
        }

        let resets_at = match &self {
            DomainError::QuotaExhausted { resets_at, .. } => Some(*resets_at),
            _ => None,
        };

        let body = match &self {
            DomainError::ValidationErrors(details) => ErrorResponse {
                code: self.code().to_string(),
                message: "Validation failed".to_string(),
                details: Some(details.clone()),
                resets_at,
            },
            _ => ErrorResponse {
                code: self.code().to_string(),
                message: self.to_string(),
                details: None,
                resets_at,
            },
        };

        (
            status,
            Json(serde_json::json!({ "success": false, "error": body })),
        )
            .into_response()
    }
}

/// Classify a raw sqlx error into a domain error, distinguishing Postgres
/// serialization failures (retry-safe) from other query errors.
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                DomainError::Transient(err.to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => DomainError::Transient(err.to_string()),
                _ => DomainError::Database(err.to_string()),
            },
            _ => DomainError::Database(err.to_string()),
        }
    }
}
