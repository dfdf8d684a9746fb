//! Per-session chunk staging
//!
//! Layout under the staging root:
//!
//! ```text
//! <staging>/<session_id>/session.json   manifest (file name, total chunks)
//! <staging>/<session_id>/<index>.part   one file per received chunk
//! <staging>/<session_id>/assembled.bin  assembly output, transient
//! ```
//!
//! Chunks and the manifest are written to uniquely named temporary files and
//! moved into place, so concurrent writers to distinct indices never interfere
//! and a reader never sees a half-written file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{UploadError, UploadResult};

/// Manifest file name inside a session directory
pub const MANIFEST_FILE: &str = "session.json";

/// Assembly output file name inside a session directory
pub const ASSEMBLED_FILE: &str = "assembled.bin";

const CHUNK_SUFFIX: &str = ".part";

/// Session attributes recorded by the first chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub file_name: String,
    pub total_chunks: u32,
    pub created_at: DateTime<Utc>,
}

impl SessionManifest {
    /// Whether a later request agrees with this manifest
    fn check(&self, session_id: &str, file_name: &str, total_chunks: u32) -> UploadResult<()> {
        if self.total_chunks != total_chunks {
            return Err(UploadError::SessionMismatch(format!(
                "session {} was opened with {} chunks, request declares {}",
                session_id, self.total_chunks, total_chunks
            )));
        }
        if self.file_name != file_name {
            return Err(UploadError::SessionMismatch(format!(
                "session {} was opened for {:?}, request declares {:?}",
                session_id, self.file_name, file_name
            )));
        }
        Ok(())
    }
}

/// Filesystem staging area for upload sessions
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root holding one directory per session
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a session; rejects ids unsafe as a path component
    pub fn session_dir(&self, session_id: &str) -> UploadResult<PathBuf> {
        scoreshare_common::session_id::validate(session_id)?;
        Ok(self.root.join(session_id))
    }

    pub fn chunk_path(&self, session_id: &str, index: u32) -> UploadResult<PathBuf> {
        Ok(self
            .session_dir(session_id)?
            .join(format!("{}{}", index, CHUNK_SUFFIX)))
    }

    pub fn manifest_path(&self, session_id: &str) -> UploadResult<PathBuf> {
        Ok(self.session_dir(session_id)?.join(MANIFEST_FILE))
    }

    pub fn assembled_path(&self, session_id: &str) -> UploadResult<PathBuf> {
        Ok(self.session_dir(session_id)?.join(ASSEMBLED_FILE))
    }

    /// Create the session on first use, or verify a request against it
    ///
    /// The first request to arrive fixes the session's file name and chunk
    /// count. Concurrent first requests race on a create-if-absent hard link,
    /// so exactly one manifest wins and every request is checked against it.
    pub async fn open_session(
        &self,
        session_id: &str,
        file_name: &str,
        total_chunks: u32,
    ) -> UploadResult<SessionManifest> {
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir).await?;

        let manifest_path = dir.join(MANIFEST_FILE);
        if let Some(existing) = self.read_manifest(session_id).await? {
            existing.check(session_id, file_name, total_chunks)?;
            return Ok(existing);
        }

        let manifest = SessionManifest {
            file_name: file_name.to_string(),
            total_chunks,
            created_at: Utc::now(),
        };
        let encoded = serde_json::to_vec(&manifest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let temp = dir.join(format!(".manifest.{}.tmp", Uuid::new_v4().simple()));
        write_synced(&temp, &encoded).await?;
        let linked = fs::hard_link(&temp, &manifest_path).await;
        let _ = fs::remove_file(&temp).await;

        match linked {
            Ok(()) => {
                tracing::debug!(session_id, file_name, total_chunks, "Opened upload session");
                Ok(manifest)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let existing = self.read_manifest(session_id).await?.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "session manifest vanished")
                })?;
                existing.check(session_id, file_name, total_chunks)?;
                Ok(existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a session's manifest; `None` if the session or manifest is absent
    pub async fn read_manifest(&self, session_id: &str) -> UploadResult<Option<SessionManifest>> {
        match fs::read(self.manifest_path(session_id)?).await {
            Ok(bytes) => {
                let manifest = serde_json::from_slice(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(manifest))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Durably store one chunk, replacing any earlier chunk at `index`
    pub async fn put_chunk(&self, session_id: &str, index: u32, bytes: &[u8]) -> UploadResult<()> {
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir).await?;

        let target = self.chunk_path(session_id, index)?;
        let temp = dir.join(format!(".{}.{}.tmp", index, Uuid::new_v4().simple()));

        if let Err(e) = write_synced(&temp, bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        tracing::trace!(session_id, chunk_index = index, bytes = bytes.len(), "Stored chunk");
        Ok(())
    }

    /// Whether a chunk is staged at `index`
    pub async fn has_chunk(&self, session_id: &str, index: u32) -> UploadResult<bool> {
        Ok(fs::try_exists(self.chunk_path(session_id, index)?).await?)
    }

    /// Whether the session's staging directory exists
    pub async fn session_exists(&self, session_id: &str) -> UploadResult<bool> {
        Ok(fs::try_exists(self.session_dir(session_id)?).await?)
    }

    /// Ids of all session directories under the staging root
    pub async fn list_sessions(&self) -> UploadResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if scoreshare_common::session_id::is_valid(&name) {
                sessions.push(name);
            }
        }
        Ok(sessions)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
