//! Upload coordinator
//!
//! Drives one chunk request through the session state machine:
//!
//! ```text
//! Open ─(chunks accumulate)─> Complete ─> Assembling ─> Validating ─> Published ─> Cleaned
//!                                                                 └─> Rejected  ─> Cleaned
//! Open | Complete | Assembling ─(cancel)─> Cancelled ─> Cleaned
//! ```
//!
//! **Locking:** every session has an async `RwLock` in `locks`. Chunk writes
//! take the read side, so writes to distinct indices proceed in parallel.
//! The completion check and everything after it, cancellation and stale
//! sweeping take the write side. Completion is re-checked under the write
//! lock, so when several requests observe the last chunk landing exactly one
//! of them assembles; the others find the chunks consumed and report `Stored`.

use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::RwLock;

use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};
use crate::services::assembler::Assembler;
use crate::services::chunk_store::{ChunkStore, SessionManifest};
use crate::services::completion_detector::CompletionDetector;
use crate::services::content_validator::ContentValidator;
use crate::services::publisher::{PublishedArtifact, Publisher};
use crate::services::session_cleaner::SessionCleaner;
use crate::storage::BlobStore;

/// Maximum accepted display file name length
const MAX_FILE_NAME_LEN: usize = 255;

/// Upload session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Complete,
    Assembling,
    Validating,
    Published,
    Rejected,
    Cancelled,
    Cleaned,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Open => "open",
            SessionState::Complete => "complete",
            SessionState::Assembling => "assembling",
            SessionState::Validating => "validating",
            SessionState::Published => "published",
            SessionState::Rejected => "rejected",
            SessionState::Cancelled => "cancelled",
            SessionState::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

fn transition(session_id: &str, from: SessionState, to: SessionState) {
    tracing::debug!(session_id, %from, %to, "Session state transition");
}

/// One chunk request
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub session_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub data: Bytes,
}

/// Result of handling one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Chunk staged; session not yet complete
    Stored { received: u32, total: u32 },
    /// This chunk completed the session and the file was published
    Published(PublishedArtifact),
}

type SessionLock = Arc<RwLock<()>>;

/// A session's lock, held in the coordinator's map while any request uses it
///
/// Dropping the last outstanding entry removes the session from the map,
/// including when a request future is dropped mid-flight.
struct LockEntry<'a> {
    coordinator: &'a UploadCoordinator,
    session_id: &'a str,
    lock: SessionLock,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut map = self.coordinator.lock_map();
        // One reference in the map plus ours
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(self.session_id);
        }
    }
}

/// Orchestrates chunk store, assembler, validator, publisher and cleaner
pub struct UploadCoordinator {
    config: UploadConfig,
    store: ChunkStore,
    detector: CompletionDetector,
    assembler: Assembler,
    validator: ContentValidator,
    publisher: Publisher,
    cleaner: SessionCleaner,
    locks: Mutex<HashMap<String, SessionLock>>,
}

impl UploadCoordinator {
    pub fn new(config: UploadConfig, blob_store: Arc<dyn BlobStore>) -> Self {
        let store = ChunkStore::new(config.staging_dir.clone());
        Self {
            detector: CompletionDetector::new(store.clone()),
            assembler: Assembler::new(store.clone(), config.max_file_bytes),
            validator: ContentValidator::new(config.allowed_media_types.clone()),
            publisher: Publisher::new(blob_store, config.public_prefix.clone()),
            cleaner: SessionCleaner::new(store.clone()),
            store,
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.store
    }

    /// Number of sessions with a request currently in flight
    pub fn in_flight_sessions(&self) -> usize {
        self.lock_map().len()
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionLock>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acquire_entry<'a>(&'a self, session_id: &'a str) -> LockEntry<'a> {
        let lock = self
            .lock_map()
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone();
        LockEntry {
            coordinator: self,
            session_id,
            lock,
        }
    }

    fn validate_request(&self, upload: &ChunkUpload) -> UploadResult<()> {
        scoreshare_common::session_id::validate(&upload.session_id)?;

        if upload.total_chunks == 0 {
            return Err(UploadError::InvalidRequest(
                "totalChunks must be at least 1".to_string(),
            ));
        }
        if upload.total_chunks > self.config.max_total_chunks {
            return Err(UploadError::InvalidRequest(format!(
                "totalChunks {} exceeds maximum {}",
                upload.total_chunks, self.config.max_total_chunks
            )));
        }
        if upload.chunk_index >= upload.total_chunks {
            return Err(UploadError::InvalidRequest(format!(
                "chunkIndex {} out of range for totalChunks {}",
                upload.chunk_index, upload.total_chunks
            )));
        }
        if upload.file_name.trim().is_empty() {
            return Err(UploadError::InvalidRequest("fileName must not be empty".to_string()));
        }
        if upload.file_name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(UploadError::InvalidRequest(format!(
                "fileName longer than {} characters",
                MAX_FILE_NAME_LEN
            )));
        }
        if upload.data.is_empty() {
            return Err(UploadError::InvalidRequest("chunk payload is empty".to_string()));
        }
        if upload.data.len() > self.config.max_chunk_bytes {
            return Err(UploadError::TooLarge {
                what: "chunk",
                limit: self.config.max_chunk_bytes as u64,
            });
        }
        Ok(())
    }

    /// Stage one chunk and, if it completes the session, publish the file
    pub async fn handle_chunk(&self, upload: ChunkUpload) -> UploadResult<ChunkOutcome> {
        self.validate_request(&upload)?;

        let entry = self.acquire_entry(&upload.session_id);
        self.handle_chunk_locked(&entry.lock, &upload).await
    }

    async fn handle_chunk_locked(
        &self,
        lock: &SessionLock,
        upload: &ChunkUpload,
    ) -> UploadResult<ChunkOutcome> {
        let session_id = upload.session_id.as_str();

        let manifest = {
            let _read = lock.read().await;
            let manifest = self
                .store
                .open_session(session_id, &upload.file_name, upload.total_chunks)
                .await?;
            self.store
                .put_chunk(session_id, upload.chunk_index, &upload.data)
                .await?;
            manifest
        };

        let _write = lock.write().await;
        if !self.detector.is_complete(session_id, manifest.total_chunks).await? {
            let received = self
                .detector
                .received_count(session_id, manifest.total_chunks)
                .await?;
            tracing::debug!(
                session_id,
                chunk_index = upload.chunk_index,
                received,
                total = manifest.total_chunks,
                "Chunk stored"
            );
            return Ok(ChunkOutcome::Stored {
                received,
                total: manifest.total_chunks,
            });
        }

        transition(session_id, SessionState::Open, SessionState::Complete);
        let artifact = self.finalize(session_id, &manifest).await?;
        Ok(ChunkOutcome::Published(artifact))
    }

    /// Assemble, validate, publish and clean a complete session
    ///
    /// Caller holds the session's write lock. Every failure cleans the
    /// session: partial assembly cannot be resumed, so storage errors are
    /// reported as `SessionFailed` rather than the retryable `Storage`.
    async fn finalize(
        &self,
        session_id: &str,
        manifest: &SessionManifest,
    ) -> UploadResult<PublishedArtifact> {
        transition(session_id, SessionState::Complete, SessionState::Assembling);
        let assembled = match self.assembler.assemble(session_id, manifest.total_chunks).await {
            Ok(assembled) => assembled,
            Err(e) => {
                tracing::error!(session_id, "Assembly failed: {}", e);
                self.discard(session_id, SessionState::Assembling).await;
                return Err(e.after_discard());
            }
        };

        transition(session_id, SessionState::Assembling, SessionState::Validating);
        if let Err(e) = self
            .validator
            .validate(&assembled.path, &self.config.expected_media_type)
            .await
        {
            transition(session_id, SessionState::Validating, SessionState::Rejected);
            self.discard(session_id, SessionState::Rejected).await;
            return Err(e.after_discard());
        }

        let artifact = match self.publisher.publish(&assembled, &manifest.file_name).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!(session_id, "Publish failed: {}", e);
                self.discard(session_id, SessionState::Validating).await;
                return Err(e.after_discard());
            }
        };
        transition(session_id, SessionState::Validating, SessionState::Published);

        // Artifact is published; a cleanup failure leaves the directory to the sweeper
        match self.cleaner.cleanup(session_id).await {
            Ok(_) => transition(session_id, SessionState::Published, SessionState::Cleaned),
            Err(e) => tracing::warn!(session_id, "Post-publish cleanup failed: {}", e),
        }

        Ok(artifact)
    }

    async fn discard(&self, session_id: &str, from: SessionState) {
        match self.cleaner.cleanup(session_id).await {
            Ok(_) => transition(session_id, from, SessionState::Cleaned),
            Err(e) => tracing::error!(session_id, "Failed to clean session: {}", e),
        }
    }

    /// Cancel a session and remove its staging artifacts
    ///
    /// Always succeeds for unknown or already cleaned sessions. Ids that are
    /// not valid session ids cannot name a staging directory and are
    /// acknowledged without touching the filesystem. Waits for an in-flight
    /// assembly of the same session to finish.
    pub async fn cancel(&self, session_id: &str) -> UploadResult<()> {
        if !scoreshare_common::session_id::is_valid(session_id) {
            tracing::debug!("Cancel for malformed session id ignored");
            return Ok(());
        }

        let removed = {
            let entry = self.acquire_entry(session_id);
            let _write = entry.lock.write().await;
            self.cleaner.cleanup(session_id).await?
        };

        if removed {
            transition(session_id, SessionState::Open, SessionState::Cancelled);
            transition(session_id, SessionState::Cancelled, SessionState::Cleaned);
            tracing::info!(session_id, "Upload cancelled");
        }
        Ok(())
    }

    /// Clean a session if its staging directory is older than `ttl`
    ///
    /// # Returns
    /// `true` if the session was removed
    pub async fn expire_if_stale(&self, session_id: &str, ttl: Duration) -> UploadResult<bool> {
        let entry = self.acquire_entry(session_id);
        let _write = entry.lock.write().await;
        self.expire_locked(session_id, ttl).await
    }

    async fn expire_locked(&self, session_id: &str, ttl: Duration) -> UploadResult<bool> {
        let dir = self.store.session_dir(session_id)?;
        let modified = match fs::metadata(&dir).await {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age < ttl {
            return Ok(false);
        }

        let removed = self.cleaner.cleanup(session_id).await?;
        if removed {
            tracing::info!(session_id, age_secs = age.as_secs(), "Swept stale upload session");
        }
        Ok(removed)
    }
}
