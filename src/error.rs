//! # Error Handling
//!
//! Domain errors raised by the incident lifecycle and repositories, plus the
//! problem+json response type the HTTP layer maps them onto.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::IncidentStatus;
use crate::telemetry;

/// Errors surfaced by an incident repository.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("incident {0} already exists")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Errors surfaced by the incident lifecycle.
#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("incident {0} not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("incident {id} is {} and cannot be {action}", .from.as_str())]
    InvalidTransition {
        id: String,
        from: IncidentStatus,
        action: &'static str,
    },
    #[error("incident {0} is not a training incident")]
    NotTraining(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("incident task did not finish: {0}")]
    Interrupted(String),
}

impl IncidentError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        IncidentError::Validation(message.into())
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Extract current trace ID from the request context (falls back to a generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<IncidentError> for ApiError {
    fn from(error: IncidentError) -> Self {
        match error {
            IncidentError::NotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Incident {} not found", id),
            ),
            IncidentError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
            }
            IncidentError::InvalidTransition { .. } | IncidentError::NotTraining(_) => {
                Self::new(StatusCode::CONFLICT, "INVALID_STATE", &error.to_string())
            }
            IncidentError::Repository(RepositoryError::Conflict(_)) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", "Incident already exists")
            }
            IncidentError::Interrupted(reason) => {
                tracing::error!(%reason, "Incident task aborted");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
            IncidentError::Repository(err) => {
                tracing::error!(error = %err, "Incident repository failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

/// Create a forbidden error (403)
pub fn forbidden(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Insufficient permissions");
    ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
