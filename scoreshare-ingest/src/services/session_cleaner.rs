//! Staging cleanup

use std::io;
use tokio::fs;

use crate::error::UploadResult;
use crate::services::chunk_store::ChunkStore;

/// Removes a session's staging directory and everything in it
#[derive(Debug, Clone)]
pub struct SessionCleaner {
    store: ChunkStore,
}

impl SessionCleaner {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    /// Remove all staging artifacts of a session
    ///
    /// Idempotent: an unknown or already cleaned session is not an error.
    ///
    /// # Returns
    /// `true` if a staging directory was removed
    pub async fn cleanup(&self, session_id: &str) -> UploadResult<bool> {
        let dir = self.store.session_dir(session_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(session_id, "Removed staging directory");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
