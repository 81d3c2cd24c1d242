//! Error types for AskDocs services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

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
    MissingField,
    UnsupportedDocument,
    PayloadTooLarge,

    // Resource errors (4xxx)
    SessionNotFound,
    NoDocuments,

    // Rate limiting (6xxx)
    RateLimited,

    // Retrieval & generation (7xxx)
    EmptyContext,
    ModelInvocationError,
    AdapterUnavailable,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::UnsupportedDocument => 1003,
            ErrorCode::PayloadTooLarge => 1004,

            // Resources (4xxx)
            ErrorCode::SessionNotFound => 4001,
            ErrorCode::NoDocuments => 4002,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Retrieval & generation (7xxx)
            ErrorCode::EmptyContext => 7001,
            ErrorCode::ModelInvocationError => 7002,
            ErrorCode::AdapterUnavailable => 7003,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Unsupported document {name}: {message}")]
    UnsupportedDocument { name: String, message: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    // Resource errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("No documents to index")]
    NoDocuments,

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Retrieval & generation
    #[error("No context available for this question")]
    EmptyContext,

    #[error("Language model invocation failed: {message}")]
    ModelInvocation { message: String },

    #[error("Adapter unavailable: {adapter}: {message}")]
    AdapterUnavailable { adapter: String, message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::UnsupportedDocument { .. } => ErrorCode::UnsupportedDocument,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            AppError::NoDocuments => ErrorCode::NoDocuments,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::EmptyContext => ErrorCode::EmptyContext,
            AppError::ModelInvocation { .. } => ErrorCode::ModelInvocationError,
            AppError::AdapterUnavailable { .. } => ErrorCode::AdapterUnavailable,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
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
            AppError::Validation { .. } |
            AppError::MissingField { .. } |
            AppError::UnsupportedDocument { .. } |
            AppError::NoDocuments => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::SessionNotFound { .. } => StatusCode::NOT_FOUND,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 422 Unprocessable: nothing to answer from
            AppError::EmptyContext => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::ModelInvocation { .. } |
            AppError::EmbeddingError { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::AdapterUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
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
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            AppError::MissingField { field } => Some(field.clone()),
            _ => None,
        };

        // Log based on severity
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

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
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
