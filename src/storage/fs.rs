//! Filesystem storage backend
//!
//! Files are written to a temporary file next to their destination and
//! renamed into place once complete. A write that is abandoned midway (for
//! example because the crawl was cancelled) drops the temporary file, so the
//! destination path either holds the previous content or the full new content.

use crate::storage::traits::{StorageError, StorageResult, Store};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Storage rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store writing below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative storage path below the root
    fn resolve(&self, path: &Path) -> StorageResult<PathBuf> {
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes || path.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(path.to_path_buf()));
        }

        Ok(self.root.join(path))
    }

    /// Creates a temporary file in the destination's directory
    async fn temp_file_for(target: &Path) -> StorageResult<(File, TempPath)> {
        let dir = target
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(target.to_path_buf()))?;
        tokio::fs::create_dir_all(dir).await?;

        let temp = tempfile::Builder::new()
            .prefix(".sumi-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        let (file, temp_path) = temp.into_parts();
        let file = File::from_std(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o644))
                .await?;
        }

        Ok((file, temp_path))
    }

    async fn persist(mut file: File, temp_path: TempPath, target: &Path) -> StorageResult<()> {
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp_path.persist(target).map_err(|e| StorageError::Persist {
            path: target.to_path_buf(),
            source: e.error,
        })
    }
}

#[async_trait]
impl Store for FsStore {
    async fn exists(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::metadata(full)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn modified(&self, path: &Path) -> Option<SystemTime> {
        let full = self.resolve(path).ok()?;
        let metadata = tokio::fs::metadata(full).await.ok()?;
        if !metadata.is_file() {
            return None;
        }
        metadata.modified().ok()
    }

    async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::Io(e),
        })
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let target = self.resolve(path)?;
        let (mut file, temp_path) = Self::temp_file_for(&target).await?;

        file.write_all(data).await?;
        Self::persist(file, temp_path, &target).await
    }

    async fn write_stream(
        &self,
        path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<u64> {
        let target = self.resolve(path)?;
        let (mut file, temp_path) = Self::temp_file_for(&target).await?;

        let written = tokio::io::copy(reader, &mut file).await?;
        Self::persist(file, temp_path, &target).await?;
        Ok(written)
    }

    async fn set_modified(&self, path: &Path, time: SystemTime) -> StorageResult<()> {
        let full = self.resolve(path)?;
        let file = std::fs::File::options().write(true).open(full)?;
        file.set_modified(time)?;
        Ok(())
    }
}
