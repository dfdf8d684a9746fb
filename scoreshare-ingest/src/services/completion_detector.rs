//! Completion detection for upload sessions
//!
//! Chunks may arrive in any order (parallel or retrying clients), so every
//! check re-scans the full index range instead of tracking a high-water mark.

use crate::error::UploadResult;
use crate::services::chunk_store::ChunkStore;

/// Determines whether all expected chunks of a session are staged
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    store: ChunkStore,
}

impl CompletionDetector {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    /// True iff a chunk exists at every index in `0..total_chunks`
    ///
    /// A missing session reports `false`.
    pub async fn is_complete(&self, session_id: &str, total_chunks: u32) -> UploadResult<bool> {
        Ok(self.first_missing(session_id, total_chunks).await?.is_none())
    }

    /// Lowest index in `0..total_chunks` with no staged chunk
    pub async fn first_missing(
        &self,
        session_id: &str,
        total_chunks: u32,
    ) -> UploadResult<Option<u32>> {
        for index in 0..total_chunks {
            if !self.store.has_chunk(session_id, index).await? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// All indices in `0..total_chunks` with no staged chunk
    pub async fn missing_chunks(&self, session_id: &str, total_chunks: u32) -> UploadResult<Vec<u32>> {
        let mut missing = Vec::new();
        for index in 0..total_chunks {
            if !self.store.has_chunk(session_id, index).await? {
                missing.push(index);
            }
        }
        Ok(missing)
    }

    /// Number of distinct indices in `0..total_chunks` already staged
    pub async fn received_count(&self, session_id: &str, total_chunks: u32) -> UploadResult<u32> {
        let missing = self.missing_chunks(session_id, total_chunks).await?;
        Ok(total_chunks - missing.len() as u32)
    }
}
