//! Upload API request/response types
//!
//! Field names on the wire are camelCase (`chunkIndex`, `fileName`,
//! `uniqueId`) to stay compatible with the existing browser client.

use serde::{Deserialize, Serialize};

// ========================================
// Endpoint paths and multipart field names
// ========================================

/// POST endpoint receiving one chunk as multipart/form-data
pub const UPLOAD_CHUNK_PATH: &str = "/api/upload/chunk";

/// POST endpoint cancelling a session (JSON body)
pub const UPLOAD_CANCEL_PATH: &str = "/api/upload/cancel";

/// Multipart field carrying the chunk bytes
pub const FIELD_FILE: &str = "file";
/// Multipart field carrying the zero-based chunk index
pub const FIELD_CHUNK_INDEX: &str = "chunkIndex";
/// Multipart field carrying the total chunk count
pub const FIELD_TOTAL_CHUNKS: &str = "totalChunks";
/// Multipart field carrying the display file name
pub const FIELD_FILE_NAME: &str = "fileName";
/// Multipart field carrying the client-generated session id
pub const FIELD_UNIQUE_ID: &str = "uniqueId";

/// Acknowledgement message for a stored, non-final chunk
pub const CHUNK_STORED_MESSAGE: &str = "Chunk uploaded successfully";

/// Acknowledgement message for a cancel request
pub const CANCELLED_MESSAGE: &str = "Upload cancelled";

// ========================================
// Chunk upload
// ========================================

/// Response for a chunk that did not complete the session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkAckResponse {
    pub message: String,
    /// Number of distinct chunk indices staged so far
    pub received: u32,
    /// Total chunk count declared for the session
    pub total: u32,
}

/// Response for the chunk that completed the session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublishedResponse {
    /// Storage path of the published file (e.g. `sheet-music/<uuid>_song.pdf`)
    pub path: String,
    /// Display file name as declared by the client
    #[serde(rename = "fileName")]
    pub file_name: String,
    /// Size of the published file in bytes
    pub size: u64,
    /// SHA-256 of the published bytes (64 hex chars)
    pub sha256: String,
}

/// Either response shape of the chunk endpoint
///
/// Used by clients to parse a 200 response without knowing in advance
/// whether their chunk was the one that completed the session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChunkResponse {
    Published(PublishedResponse),
    Stored(ChunkAckResponse),
}

// ========================================
// Cancellation
// ========================================

/// Body of the cancel endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CancelRequest {
    #[serde(rename = "uniqueId")]
    pub unique_id: String,
}

/// Response of the cancel endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CancelResponse {
    pub message: String,
}

impl Default for CancelResponse {
    fn default() -> Self {
        Self {
            message: CANCELLED_MESSAGE.to_string(),
        }
    }
}

// ========================================
// Errors
// ========================================

/// Error response envelope
///
/// ```json
/// {"error": {"code": "INVALID_FILE_TYPE", "message": "...", "retryable": false}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether resending the same request may succeed
    #[serde(default)]
    pub retryable: bool,
}
