use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Errors from the metrics backend client.
///
/// Each failure mode is a distinct kind so callers can react differently to
/// an unreachable backend, a slow backend, and a backend that answered with
/// garbage. These are never collapsed into a generic error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached (DNS, refused connection, TLS).
    #[error("backend unreachable: {0}")]
    Connectivity(String),

    /// The call exceeded its deadline.
    #[error("backend request timed out: {0}")]
    Timeout(String),

    /// The caller abandoned the call before it completed.
    #[error("backend request cancelled: {0}")]
    Cancelled(String),

    /// The backend answered with a non-2xx status. The body is retained for
    /// diagnostics.
    #[error("backend returned {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The backend answered 2xx but the payload did not match the expected
    /// envelope.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// The circuit breaker is open; no network attempt was made.
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connectivity(err.to_string())
        } else if let Some(status) = err.status() {
            Self::HttpStatus {
                status,
                body: err.to_string(),
            }
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Connectivity(err.to_string())
        }
    }
}

/// Error from a Service Catalog operation.
#[derive(Debug, Error)]
#[error("catalog error: {0}")]
pub struct CatalogError(pub String);

/// Errors from the discovery engine lifecycle.
///
/// Per-service catalog write failures are not represented here: they are
/// logged and counted inside the cycle and never abort the remaining work.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// `start()` was called on an engine that is already running.
    #[error("discovery engine is already running")]
    AlreadyRunning,

    /// The connectivity probe before scheduling failed.
    #[error("discovery startup probe failed: {0}")]
    Probe(#[source] BackendError),

    /// Fetching the metric catalog failed; the whole cycle is aborted.
    #[error("discovery cycle failed: {0}")]
    Cycle(#[source] BackendError),
}

/// Category of a rejected query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    ForbiddenMetric,
    ExcessiveRange,
    HighCardinality,
    ExpensiveOperation,
    TooManyNested,
    ExcessiveLength,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForbiddenMetric => "forbidden_metric",
            Self::ExcessiveRange => "excessive_range",
            Self::HighCardinality => "high_cardinality",
            Self::ExpensiveOperation => "expensive_operation",
            Self::TooManyNested => "too_many_nested",
            Self::ExcessiveLength => "excessive_length",
        }
    }
}

/// A structured safety rejection: category, human explanation, and a
/// remediation suggestion. Validation never returns a bare boolean.
#[derive(Debug, Clone)]
pub struct SafetyViolation {
    pub kind: ViolationKind,
    pub message: String,
    pub suggestion: String,
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "query rejected ({}): {}. {}",
            self.kind.as_str(),
            self.message,
            self.suggestion
        )
    }
}

impl std::error::Error for SafetyViolation {}

/// Application error types surfaced by the HTTP layer
#[derive(Debug)]
pub enum AppError {
    /// Configuration error
    ConfigError(String),
    /// Query rejected by the safety validator
    Validation(SafetyViolation),
    /// Backend client or circuit breaker error
    Backend(BackendError),
    /// Service catalog error
    Catalog(CatalogError),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::Validation(v) => write!(f, "{}", v),
            Self::Backend(e) => write!(f, "Backend error: {}", e),
            Self::Catalog(e) => write!(f, "{}", e),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
            Self::Backend(e) => (backend_status(e), e.to_string()),
            Self::Catalog(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn backend_status(error: &BackendError) -> StatusCode {
    match error {
        BackendError::Connectivity(_) => StatusCode::BAD_GATEWAY,
        BackendError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        BackendError::Cancelled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        BackendError::HttpStatus { .. } => StatusCode::BAD_GATEWAY,
        BackendError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        BackendError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::ConfigError(_) => "config_error",
        AppError::Validation(v) => v.kind.as_str(),
        AppError::Backend(e) => match e {
            BackendError::Connectivity(_) => "backend_unreachable",
            BackendError::Timeout(_) => "backend_timeout",
            BackendError::Cancelled(_) => "request_cancelled",
            BackendError::HttpStatus { .. } => "backend_http_error",
            BackendError::MalformedResponse(_) => "malformed_response",
            BackendError::CircuitOpen(_) => "circuit_open",
        },
        AppError::Catalog(_) => "catalog_error",
        AppError::InternalError(_) => "internal_error",
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

impl From<SafetyViolation> for AppError {
    fn from(err: SafetyViolation) -> Self {
        Self::Validation(err)
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let error = BackendError::Timeout("deadline of 30s exceeded".to_string());
        assert_eq!(
            error.to_string(),
            "backend request timed out: deadline of 30s exceeded"
        );
    }

    #[test]
    fn test_violation_display_includes_suggestion() {
        let violation = SafetyViolation {
            kind: ViolationKind::ForbiddenMetric,
            message: "query references a sensitive metric".to_string(),
            suggestion: "Remove the sensitive metric from the query".to_string(),
        };
        let text = violation.to_string();
        assert!(text.contains("forbidden_metric"));
        assert!(text.contains("Remove the sensitive metric"));
    }

    #[test]
    fn test_error_type_name() {
        let err = AppError::Backend(BackendError::CircuitOpen("breaker open".to_string()));
        assert_eq!(error_type_name(&err), "circuit_open");

        let err = AppError::Validation(SafetyViolation {
            kind: ViolationKind::TooManyNested,
            message: String::new(),
            suggestion: String::new(),
        });
        assert_eq!(error_type_name(&err), "too_many_nested");
    }

    #[tokio::test]
    async fn test_circuit_open_maps_to_service_unavailable() {
        let err = AppError::Backend(BackendError::CircuitOpen("breaker open".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_gateway_timeout() {
        let err = AppError::Backend(BackendError::Timeout("30s".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
