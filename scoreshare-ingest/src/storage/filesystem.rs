//! Filesystem blob store rooted at the public storage directory

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::BlobStore;

/// Blob store writing each key to `<root>/<key>`
///
/// Writes go to a hidden temporary sibling first and are renamed into place,
/// so readers never observe a partially written blob.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, rejecting keys that could escape it
    pub fn resolve(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage key: {:?}", key),
            ));
        }
        Ok(self.root.join(relative))
    }

    /// Temporary sibling path used while writing `target`
    ///
    /// Independent of the target's name so it fits wherever the target does.
    fn temp_path_for(target: &Path) -> PathBuf {
        target.with_file_name(format!(".{}.tmp", Uuid::new_v4().simple()))
    }

    async fn ensure_parent(target: &Path) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Rename `temp` onto `target`, removing `temp` if the rename fails
    async fn commit(temp: &Path, target: &Path) -> io::Result<()> {
        if let Err(e) = fs::rename(temp, target).await {
            let _ = fs::remove_file(temp).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn backend_id(&self) -> &'static str {
        "filesystem"
    }

    async fn put(&self, key: &str, data: &[u8]) -> io::Result<()> {
        let target = self.resolve(key)?;
        Self::ensure_parent(&target).await?;

        let temp = Self::temp_path_for(&target);
        let written = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        Self::commit(&temp, &target).await
    }

    async fn put_file(&self, key: &str, source: &Path) -> io::Result<u64> {
        let target = self.resolve(key)?;
        Self::ensure_parent(&target).await?;

        let temp = Self::temp_path_for(&target);
        let copied = async {
            let bytes = fs::copy(source, &temp).await?;
            fs::File::open(&temp).await?.sync_all().await?;
            Ok::<u64, io::Error>(bytes)
        }
        .await;

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                return Err(e);
            }
        };

        Self::commit(&temp, &target).await?;
        tracing::debug!(key, bytes, "Stored blob");
        Ok(bytes)
    }

    async fn get(&self, key: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(key)?).await
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.resolve(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, key: &str) -> io::Result<bool> {
        fs::try_exists(self.resolve(key)?).await
    }

    async fn size(&self, key: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.resolve(key)?).await?.len())
    }
}
