//! Error types for the Palimpsest server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::document::DocumentError;
use crate::storage::StorageError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The file existed but its session expired and it was reclaimed
    #[error("Gone: {0}")]
    Gone(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Storage(StorageError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            AppError::Document(DocumentError::Open(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Document(DocumentError::Malformed(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_)
            | AppError::Storage(_)
            | AppError::Document(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound(_) | AppError::Storage(StorageError::NotFound(_)) => "not_found",
            AppError::Gone(_) => "gone",
            AppError::BadRequest(_) | AppError::Storage(StorageError::InvalidKey(_)) => {
                "bad_request"
            }
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::Timeout(_) => "timeout",
            AppError::Document(DocumentError::Open(_) | DocumentError::Malformed(_)) => {
                "invalid_document"
            }
            AppError::Internal(_) => "internal_error",
            AppError::Storage(_) => "storage_error",
            AppError::Document(_) => "document_error",
            AppError::Io(_) => "io_error",
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            match &self {
                AppError::Timeout(_) => self.to_string(),
                _ => "An internal error occurred".to_string(),
            }
        } else {
            tracing::debug!(error = %self, "Request rejected");
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error: self.error_type().to_string(),
            message,
        });

        (status, body).into_response()
    }
}
