//! Chunk assembly
//!
//! Concatenates a session's chunks in ascending index order into one file,
//! deleting each chunk as soon as it has been copied so peak staging usage
//! stays close to one file's worth of bytes.

use sha2::{Digest, Sha256};
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::error::{UploadError, UploadResult};
use crate::services::chunk_store::ChunkStore;
use crate::services::completion_detector::CompletionDetector;

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Transient assembly output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    pub session_id: String,
    /// Location inside the session's staging directory
    pub path: PathBuf,
    pub size: u64,
    /// SHA-256 of the assembled bytes (lowercase hex)
    pub sha256: String,
}

/// Concatenates staged chunks into a single file
#[derive(Debug, Clone)]
pub struct Assembler {
    store: ChunkStore,
    detector: CompletionDetector,
    max_file_bytes: u64,
}

impl Assembler {
    pub fn new(store: ChunkStore, max_file_bytes: u64) -> Self {
        let detector = CompletionDetector::new(store.clone());
        Self {
            store,
            detector,
            max_file_bytes,
        }
    }

    /// Assemble chunks `0..total_chunks` of a session
    ///
    /// Fails with `IncompleteSession` before writing anything if a chunk is
    /// missing. On any error the partial output stays in the staging
    /// directory for the session cleaner; permanent storage is never touched.
    pub async fn assemble(&self, session_id: &str, total_chunks: u32) -> UploadResult<AssembledFile> {
        if let Some(missing_index) = self.detector.first_missing(session_id, total_chunks).await? {
            return Err(UploadError::IncompleteSession {
                session_id: session_id.to_string(),
                missing_index,
            });
        }

        let dest_path = self.store.assembled_path(session_id)?;
        let mut dest = BufWriter::new(fs::File::create(&dest_path).await?);
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buffer = vec![0u8; COPY_BUFFER_BYTES];

        for index in 0..total_chunks {
            let chunk_path = self.store.chunk_path(session_id, index)?;
            let mut chunk = match fs::File::open(&chunk_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(UploadError::IncompleteSession {
                        session_id: session_id.to_string(),
                        missing_index: index,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            loop {
                let n = chunk.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }
                size += n as u64;
                if size > self.max_file_bytes {
                    return Err(UploadError::TooLarge {
                        what: "assembled file",
                        limit: self.max_file_bytes,
                    });
                }
                hasher.update(&buffer[..n]);
                dest.write_all(&buffer[..n]).await?;
            }

            drop(chunk);
            fs::remove_file(&chunk_path).await?;
        }

        dest.flush().await?;
        dest.get_ref().sync_all().await?;

        let sha256 = format!("{:x}", hasher.finalize());
        tracing::debug!(session_id, size, total_chunks, "Assembled upload");

        Ok(AssembledFile {
            session_id: session_id.to_string(),
            path: dest_path,
            size,
            sha256,
        })
    }
}
