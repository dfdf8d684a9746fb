//! Wire contract shared by the ingest service and the upload client

use scoreshare_common::api::{
    CancelResponse, CANCELLED_MESSAGE, CHUNK_STORED_MESSAGE, FIELD_CHUNK_INDEX, FIELD_FILE,
    FIELD_FILE_NAME, FIELD_TOTAL_CHUNKS, FIELD_UNIQUE_ID, UPLOAD_CANCEL_PATH, UPLOAD_CHUNK_PATH,
};

#[test]
fn test_endpoint_paths() {
    assert_eq!(UPLOAD_CHUNK_PATH, "/api/upload/chunk");
    assert_eq!(UPLOAD_CANCEL_PATH, "/api/upload/cancel");
}

#[test]
fn test_multipart_field_names_match_browser_client() {
    assert_eq!(
        [
            FIELD_FILE,
            FIELD_CHUNK_INDEX,
            FIELD_TOTAL_CHUNKS,
            FIELD_FILE_NAME,
            FIELD_UNIQUE_ID
        ],
        ["file", "chunkIndex", "totalChunks", "fileName", "uniqueId"]
    );
}

#[test]
fn test_acknowledgement_messages() {
    assert_eq!(CHUNK_STORED_MESSAGE, "Chunk uploaded successfully");
    assert_eq!(CANCELLED_MESSAGE, "Upload cancelled");
    assert_eq!(CancelResponse::default().message, CANCELLED_MESSAGE);
}
