//! Error types for ResearchEase services
//!
//! Provides a comprehensive error handling system with:
//! - The upload/analysis workflow taxonomy (invalid type, too large,
//!   unauthenticated, upload/persist/analysis failures, not found)
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
    InvalidType,
    TooLarge,
    InvalidTransition,

    // Authentication errors (2xxx)
    Unauthenticated,
    Unauthorized,
    ExpiredToken,

    // Resource errors (4xxx)
    NotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Rate limiting (6xxx)
    RateLimited,

    // Persistence errors (7xxx)
    PersistFailed,
    DatabaseError,

    // External service errors (8xxx)
    UploadFailed,
    AnalysisFailed,
    UpstreamError,

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
            ErrorCode::InvalidType => 1002,
            ErrorCode::TooLarge => 1003,
            ErrorCode::InvalidTransition => 1004,

            ErrorCode::Unauthenticated => 2001,
            ErrorCode::Unauthorized => 2002,
            ErrorCode::ExpiredToken => 2003,

            ErrorCode::NotFound => 4001,

            ErrorCode::Conflict => 5001,

            ErrorCode::RateLimited => 6001,

            ErrorCode::PersistFailed => 7001,
            ErrorCode::DatabaseError => 7002,

            ErrorCode::UploadFailed => 8001,
            ErrorCode::AnalysisFailed => 8002,
            ErrorCode::UpstreamError => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Intake validation errors
    #[error("Only PDF files are supported (got {media_type})")]
    InvalidType { media_type: String },

    #[error("File size exceeds the maximum limit of {limit_mb} MB ({size} bytes)")]
    TooLarge { size: usize, limit: usize, limit_mb: usize },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid status transition for paper {paper_id}: {from} -> {to}")]
    InvalidTransition {
        paper_id: String,
        from: String,
        to: String,
    },

    // Authentication errors
    #[error("You must be logged in to perform this action")]
    Unauthenticated,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Token expired")]
    ExpiredToken,

    // Workflow errors
    #[error("Upload failed for {path}: {message}")]
    UploadFailed { path: String, message: String },

    #[error("Failed to persist {entity}: {message}")]
    PersistFailed { entity: String, message: String },

    #[error("Analysis failed for paper {paper_id}: {message}")]
    AnalysisFailed { paper_id: String, message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    // External service errors
    #[error("Upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

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
    /// Shorthand for a missing paper
    pub fn paper_not_found(id: impl ToString) -> Self {
        AppError::NotFound {
            resource_type: "paper".to_string(),
            id: id.to_string(),
        }
    }

    /// Wrap any persistence failure as `PersistFailed`, keeping already
    /// classified workflow errors intact.
    pub fn into_persist_failed(self, entity: &str) -> Self {
        match self {
            AppError::PersistFailed { .. }
            | AppError::InvalidTransition { .. }
            | AppError::Duplicate { .. } => self,
            other => AppError::PersistFailed {
                entity: entity.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidType { .. } => ErrorCode::InvalidType,
            AppError::TooLarge { .. } => ErrorCode::TooLarge,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::Unauthenticated => ErrorCode::Unauthenticated,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::UploadFailed { .. } => ErrorCode::UploadFailed,
            AppError::PersistFailed { .. } => ErrorCode::PersistFailed,
            AppError::AnalysisFailed { .. } => ErrorCode::AnalysisFailed,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::Upstream { .. } | AppError::HttpClient(_) => ErrorCode::UpstreamError,
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

            // 401 Unauthorized
            AppError::Unauthenticated
            | AppError::Unauthorized { .. }
            | AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Duplicate { .. } | AppError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }

            // 413 Payload Too Large
            AppError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 415 Unsupported Media Type
            AppError::InvalidType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::PersistFailed { .. }
            | AppError::Database(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::UploadFailed { .. }
            | AppError::AnalysisFailed { .. }
            | AppError::Upstream { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Validation errors are recovered locally and never touch the gateway
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::InvalidType { .. } | AppError::TooLarge { .. } | AppError::Validation { .. }
        )
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
            AppError::AnalysisFailed { paper_id, .. } => {
                Some(serde_json::json!({ "paper_id": paper_id }))
            }
            AppError::TooLarge { limit, .. } => Some(serde_json::json!({ "limit_bytes": limit })),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::paper_not_found("P1");
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_intake_errors_are_validation() {
        let err = AppError::TooLarge {
            size: 15 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
            limit_mb: 10,
        };
        assert!(err.is_validation());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.is_client_error());

        let err = AppError::InvalidType {
            media_type: "image/png".into(),
        };
        assert!(err.is_validation());
        assert_eq!(err.code(), ErrorCode::InvalidType);
    }

    #[test]
    fn test_gateway_errors_are_not_validation() {
        let err = AppError::UploadFailed {
            path: "a.pdf".into(),
            message: "bucket missing".into(),
        };
        assert!(!err.is_validation());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(AppError::Unauthenticated.is_client_error());
    }

    #[test]
    fn test_into_persist_failed_keeps_classified_errors() {
        let err = AppError::Duplicate {
            message: "analysis".into(),
        }
        .into_persist_failed("analysis");
        assert_eq!(err.code(), ErrorCode::Conflict);

        let err = AppError::Internal {
            message: "boom".into(),
        }
        .into_persist_failed("paper");
        assert_eq!(err.code(), ErrorCode::PersistFailed);
        assert!(err.to_string().contains("paper"));
    }
}
