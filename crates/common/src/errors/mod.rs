//! Error types for DocQA services
//!
//! Provides:
//! - A single error enum for every pipeline stage and collaborator
//! - Retry classification (transport failures vs. contract violations)
//! - HTTP status code mapping and structured error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Backend errors (8xxx)
    BackendUnavailable,
    MalformedResponse,
    UpstreamError,
    DatabaseError,

    // Query errors
    QueryFailed,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::BackendUnavailable => 8001,
            ErrorCode::MalformedResponse => 8002,
            ErrorCode::UpstreamError => 8003,
            ErrorCode::DatabaseError => 8004,

            ErrorCode::QueryFailed => 8500,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Transport-level failure talking to a search, embedding, rerank or
    /// generation backend. Retryable.
    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable { backend: String, message: String },

    /// A backend answered with data that violates the expected shape.
    /// Never retried.
    #[error("Malformed response from {backend}: {message}")]
    MalformedResponse { backend: String, message: String },

    /// A backend rejected the request itself. Never retried.
    #[error("Upstream error from {backend} ({status}): {message}")]
    Upstream {
        backend: String,
        status: u16,
        message: String,
    },

    /// Terminal failure of a single question-answering request.
    #[error("Query failed during {stage}: {source}")]
    QueryFailed {
        query: String,
        stage: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a transport failure on `backend`
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a contract violation by `backend`
    pub fn malformed(backend: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::MalformedResponse {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Shorthand for invalid caller input
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Classify a non-success HTTP status returned by `backend`.
    ///
    /// Throttling, request timeouts and 5xx are transport failures.
    /// Rejected credentials are a deployment problem; any other status is
    /// an upstream rejection that a retry would repeat.
    pub fn from_status(backend: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("API error {}: {}", status, body);
        match status.as_u16() {
            408 | 429 | 500..=599 => AppError::unavailable(backend, message),
            401 | 403 => AppError::Configuration {
                message: format!("{} rejected credentials: {}", backend, message),
            },
            code => AppError::Upstream {
                backend: backend.to_string(),
                status: code,
                message,
            },
        }
    }

    /// Classify a failure while reading a success response body from `backend`
    pub fn from_body_error(backend: &str, err: reqwest::Error) -> Self {
        if err.is_decode() && !err.is_timeout() {
            AppError::malformed(backend, format!("Failed to parse response: {}", err))
        } else {
            AppError::unavailable(backend, format!("Failed to read response: {}", err))
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::BackendUnavailable { .. } => ErrorCode::BackendUnavailable,
            AppError::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::QueryFailed { .. } => ErrorCode::QueryFailed,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::MalformedResponse { .. } | AppError::Upstream { .. } | AppError::HttpClient(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable
            AppError::BackendUnavailable { .. } | AppError::Database(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            AppError::QueryFailed { source, .. } => source.status_code(),
        }
    }

    /// Whether a retry of the same call could plausibly succeed.
    ///
    /// Only transport failures qualify; contract violations and bad input
    /// fail fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::BackendUnavailable { .. } | AppError::Database(_) => true,
            AppError::HttpClient(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }

    /// Attach the query text and failing stage to an error.
    ///
    /// Already-wrapped errors are returned unchanged.
    pub fn into_query_failure(self, query: &str, stage: &str) -> Self {
        match self {
            AppError::QueryFailed { .. } => self,
            other => AppError::QueryFailed {
                query: query.to_string(),
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through `QueryFailed`
    pub fn root(&self) -> &AppError {
        match self {
            AppError::QueryFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::QueryFailed { query, stage, source } => Some(serde_json::json!({
                "query": query,
                "stage": stage,
                "reason": source.code(),
            })),
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_map_to_gateway_statuses() {
        let err = AppError::unavailable("cohere", "connection refused");
        assert_eq!(err.code(), ErrorCode::BackendUnavailable);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::malformed("elasticsearch", "missing hits");
        assert_eq!(err.code(), ErrorCode::MalformedResponse);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_retry_classification() {
        assert!(AppError::unavailable("milvus", "timeout").is_retryable());
        assert!(!AppError::malformed("cohere", "index out of range").is_retryable());
        assert!(!AppError::validation("top_k", "must be positive").is_retryable());
        assert!(!AppError::Internal { message: "bug".into() }.is_retryable());
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode as Http;

        for status in [Http::TOO_MANY_REQUESTS, Http::REQUEST_TIMEOUT, Http::BAD_GATEWAY, Http::SERVICE_UNAVAILABLE] {
            let err = AppError::from_status("cohere", status, "");
            assert!(matches!(err, AppError::BackendUnavailable { .. }), "{status}");
            assert!(err.is_retryable());
        }

        for status in [Http::UNAUTHORIZED, Http::FORBIDDEN] {
            let err = AppError::from_status("llm", status, "invalid api key");
            assert!(matches!(err, AppError::Configuration { .. }), "{status}");
            assert!(!err.is_retryable());
        }

        for status in [Http::BAD_REQUEST, Http::NOT_FOUND, Http::UNPROCESSABLE_ENTITY] {
            let err = AppError::from_status("elasticsearch", status, "");
            assert_eq!(err.code(), ErrorCode::UpstreamError);
            assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::validation("query", "must not be empty");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_query_failure_wraps_once() {
        let err = AppError::unavailable("cohere", "503")
            .into_query_failure("what is rrf?", "rerank")
            .into_query_failure("what is rrf?", "generate");

        match &err {
            AppError::QueryFailed { query, stage, .. } => {
                assert_eq!(query, "what is rrf?");
                assert_eq!(stage, "rerank");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code(), ErrorCode::QueryFailed);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.root().code(), ErrorCode::BackendUnavailable);
        assert!(!err.is_retryable());
    }
}
