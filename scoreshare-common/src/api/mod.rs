//! API module for the chunked upload protocol
//!
//! Shared by the ingest service (which serves these types) and the upload
//! client (which sends and parses them). Contains ONLY plain serde types and
//! constants; no HTTP framework dependencies.

pub mod types;

pub use types::{
    CancelRequest, CancelResponse, ChunkAckResponse, ChunkResponse, ErrorBody, ErrorResponse,
    PublishedResponse,
};
pub use types::{
    CANCELLED_MESSAGE, CHUNK_STORED_MESSAGE, FIELD_CHUNK_INDEX, FIELD_FILE, FIELD_FILE_NAME,
    FIELD_TOTAL_CHUNKS, FIELD_UNIQUE_ID, UPLOAD_CANCEL_PATH, UPLOAD_CHUNK_PATH,
};
