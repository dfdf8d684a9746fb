//! Error types for scoreshare-ingest
//!
//! `UploadError` is the pipeline's error; `ApiError` maps it (and request
//! parsing failures) onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scoreshare_common::api::{ErrorBody, ErrorResponse};
use thiserror::Error;

/// Message returned to clients when content validation fails
pub const INVALID_FILE_TYPE_MESSAGE: &str = "Invalid file type. Only PDF allowed.";

/// Chunked upload pipeline error
#[derive(Debug, Error)]
pub enum UploadError {
    /// Assembled file content does not match the expected media type
    #[error("Invalid content: expected {expected}, detected {detected}")]
    InvalidContent { expected: String, detected: String },

    /// Assembly attempted before every chunk was present
    #[error("Session {session_id} is incomplete: chunk {missing_index} missing")]
    IncompleteSession {
        session_id: String,
        missing_index: u32,
    },

    /// I/O failure in staging or permanent storage
    #[error("Storage failure: {0}")]
    Storage(#[from] std::io::Error),

    /// I/O failure while finalizing a complete session; the session was
    /// discarded, so only a fresh upload can succeed
    #[error("Upload failed after all chunks were received: {0}")]
    SessionFailed(#[source] std::io::Error),

    /// Request fields failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request disagrees with the session's recorded file name or chunk count
    #[error("Session mismatch: {0}")]
    SessionMismatch(String),

    /// Chunk or assembled file exceeds the configured limit
    #[error("Upload too large: {what} exceeds {limit} bytes")]
    TooLarge { what: &'static str, limit: u64 },
}

impl From<scoreshare_common::Error> for UploadError {
    fn from(err: scoreshare_common::Error) -> Self {
        match err {
            scoreshare_common::Error::Io(e) => UploadError::Storage(e),
            other => UploadError::InvalidRequest(other.to_string()),
        }
    }
}

impl UploadError {
    /// Error to report once the session it belongs to has been discarded
    pub fn after_discard(self) -> Self {
        match self {
            UploadError::Storage(e) => UploadError::SessionFailed(e),
            other => other,
        }
    }
}

/// Result type for the upload pipeline
pub type UploadResult<T> = Result<T, UploadError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload pipeline error
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, retryable) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, false),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, true)
            }
            ApiError::Upload(err) => match err {
                UploadError::InvalidContent { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INVALID_FILE_TYPE",
                    INVALID_FILE_TYPE_MESSAGE.to_string(),
                    false,
                ),
                UploadError::IncompleteSession { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    err.to_string(),
                    false,
                ),
                UploadError::Storage(ref e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_FAILURE",
                    e.to_string(),
                    true,
                ),
                UploadError::SessionFailed(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UPLOAD_FAILED",
                    err.to_string(),
                    false,
                ),
                UploadError::InvalidRequest(msg) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, false)
                }
                UploadError::SessionMismatch(msg) => {
                    (StatusCode::CONFLICT, "SESSION_MISMATCH", msg, false)
                }
                UploadError::TooLarge { .. } => (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "TOO_LARGE",
                    err.to_string(),
                    false,
                ),
            },
        };

        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                retryable,
            },
        });

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
