//! Publishing assembled files to permanent storage

use std::io;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::UploadResult;
use crate::services::assembler::AssembledFile;
use crate::storage::BlobStore;

/// Name used when nothing of the declared name survives sanitising
const FALLBACK_FILE_NAME: &str = "upload.pdf";

/// Maximum sanitised name length in bytes
///
/// Leaves room for the `<uuid>_` prefix and the blob store's temporary
/// name within a 255-byte file name limit.
const MAX_NAME_BYTES: usize = 150;

/// Longest extension kept when a name has to be shortened
const MAX_EXTENSION_BYTES: usize = 16;

/// Final output of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    /// Storage key in the blob store
    pub path: String,
    pub size: u64,
    /// Display name as declared by the client
    pub file_name: String,
    /// SHA-256 of the stored bytes (lowercase hex)
    pub sha256: String,
}

/// Reduce a client-supplied name to a safe storage-key suffix
///
/// Keeps only the final path component, then only alphanumerics, `.`, `-`
/// and `_`. Names over 150 bytes lose the end of their stem; a short
/// extension is kept.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");

    let cleaned: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '-' || *c == '_')
        .collect();
    let cleaned = shorten(&cleaned);

    if cleaned.trim_matches('.').is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

fn shorten(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }

    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name, ""),
    };
    let mut stem_end = MAX_NAME_BYTES - extension.len();
    while !stem.is_char_boundary(stem_end) {
        stem_end -= 1;
    }
    format!("{}{}", &stem[..stem_end], extension)
}

/// Moves validated files into the blob store under collision-resistant keys
pub struct Publisher {
    store: Arc<dyn BlobStore>,
    prefix: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// `<prefix>/<uuid>_<sanitized name>`
    pub fn storage_key(&self, desired_name: &str) -> String {
        let name = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(desired_name));
        if self.prefix.is_empty() {
            name
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    /// Copy an assembled file into permanent storage
    ///
    /// Either the artifact is fully present under its new key, or an error is
    /// returned and nothing remains under that key.
    pub async fn publish(
        &self,
        assembled: &AssembledFile,
        desired_name: &str,
    ) -> UploadResult<PublishedArtifact> {
        let key = self.storage_key(desired_name);
        self.store.put_file(&key, &assembled.path).await?;

        let stored_size = match self.store.size(&key).await {
            Ok(size) => size,
            Err(e) => {
                self.discard(&key).await;
                return Err(e.into());
            }
        };
        if stored_size != assembled.size {
            self.discard(&key).await;
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "published size {} does not match assembled size {}",
                    stored_size, assembled.size
                ),
            )
            .into());
        }

        tracing::info!(
            session_id = %assembled.session_id,
            key = %key,
            size = stored_size,
            backend = self.store.backend_id(),
            "Published upload"
        );

        Ok(PublishedArtifact {
            path: key,
            size: stored_size,
            file_name: desired_name.to_string(),
            sha256: assembled.sha256.clone(),
        })
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::error!(key, "Failed to remove partially published blob: {}", e);
        }
    }
}
