//! Content validation by magic bytes
//!
//! The file name and any client-declared type are ignored; only the leading
//! bytes of the assembled file decide its media type.

use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{UploadError, UploadResult};

/// Bytes read from the head of a file for type detection
const SNIFF_BYTES: usize = 8192;

/// Reported when `infer` recognises nothing
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Detect a media type from leading bytes
pub fn detect_media_type(head: &[u8]) -> Option<&'static str> {
    infer::get(head).map(|kind| kind.mime_type())
}

/// Confirms assembled files match an allow-listed media type
#[derive(Debug, Clone)]
pub struct ContentValidator {
    allowed_media_types: Vec<String>,
}

impl ContentValidator {
    pub fn new(allowed_media_types: Vec<String>) -> Self {
        Self { allowed_media_types }
    }

    pub fn is_allowed(&self, media_type: &str) -> bool {
        self.allowed_media_types.iter().any(|t| t == media_type)
    }

    /// Check that the file at `path` is of `expected_media_type`
    ///
    /// # Returns
    /// * `Ok(())` - content matches and the type is allow-listed
    /// * `Err(InvalidContent)` - mismatch, unrecognised content, or type not allowed
    /// * `Err(Storage)` - file could not be read
    pub async fn validate(&self, path: &Path, expected_media_type: &str) -> UploadResult<()> {
        let file = fs::File::open(path).await?;
        let mut head = Vec::with_capacity(SNIFF_BYTES);
        file.take(SNIFF_BYTES as u64).read_to_end(&mut head).await?;

        let detected = detect_media_type(&head).unwrap_or(UNKNOWN_MEDIA_TYPE);

        if detected != expected_media_type || !self.is_allowed(expected_media_type) {
            tracing::warn!(
                expected = %expected_media_type,
                detected = %detected,
                size = head.len(),
                "File content does not match expected media type"
            );
            return Err(UploadError::InvalidContent {
                expected: expected_media_type.to_string(),
                detected: detected.to_string(),
            });
        }

        Ok(())
    }
}
