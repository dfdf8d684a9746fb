//! Permanent blob storage
//!
//! Published files are handed to a [`BlobStore`]: an opaque key/value store
//! keyed by relative path strings such as `sheet-music/<uuid>_song.pdf`.

use async_trait::async_trait;
use std::io;
use std::path::Path;

pub mod filesystem;

pub use filesystem::FilesystemBlobStore;

/// Blob store trait - permanent storage backends implement this
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend identifier for logging (e.g., "filesystem")
    fn backend_id(&self) -> &'static str;

    /// Store `data` under `key`, replacing any existing blob
    async fn put(&self, key: &str, data: &[u8]) -> io::Result<()>;

    /// Copy the file at `source` into the store under `key`
    ///
    /// Either the blob is fully present under `key` afterwards, or an error is
    /// returned and nothing is stored under `key`.
    ///
    /// # Returns
    /// Number of bytes stored
    async fn put_file(&self, key: &str, source: &Path) -> io::Result<u64>;

    /// Read the full blob stored under `key`
    async fn get(&self, key: &str) -> io::Result<Vec<u8>>;

    /// Delete the blob under `key`; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> io::Result<()>;

    /// Whether a blob exists under `key`
    async fn exists(&self, key: &str) -> io::Result<bool>;

    /// Size in bytes of the blob under `key`
    async fn size(&self, key: &str) -> io::Result<u64>;
}
