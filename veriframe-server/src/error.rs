//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use veriframe_core::{BatchError, StoreError};

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not found - requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Batch engine error
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Batch(ref e) => match e {
                BatchError::NotFound(_) => StatusCode::NOT_FOUND,

                // State conflicts → 409
                BatchError::AlreadyTerminal { .. }
                | BatchError::NotTerminal { .. }
                | BatchError::DuplicateJob(_)
                | BatchError::NothingToRetry(_) => StatusCode::CONFLICT,

                // Client-provided invalid input → 400
                BatchError::DuplicateImageId(_) | BatchError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }

                BatchError::WaitTimeout(_) => StatusCode::GATEWAY_TIMEOUT,

                BatchError::Store(StoreError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
                BatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Batch(ref e) => match e {
                BatchError::NotFound(_) => "JOB_NOT_FOUND",
                BatchError::AlreadyTerminal { .. } => "JOB_ALREADY_TERMINAL",
                BatchError::NotTerminal { .. } => "JOB_NOT_TERMINAL",
                BatchError::DuplicateJob(_) => "DUPLICATE_JOB",
                BatchError::DuplicateImageId(_) => "DUPLICATE_IMAGE_ID",
                BatchError::InvalidInput(_) => "INVALID_INPUT",
                BatchError::NothingToRetry(_) => "NOTHING_TO_RETRY",
                BatchError::WaitTimeout(_) => "WAIT_TIMEOUT",
                BatchError::Store(_) => "STORE_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Store errors may carry connection strings or SQL; keep them in the logs
            Self::Batch(BatchError::Store(_)) => "Job store error".to_string(),
            Self::Batch(ref e) => e.to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Batch(BatchError::Store(_)) => "store",
            Self::Batch(_) => "batch",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
