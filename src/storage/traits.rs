//! Storage traits and error types
//!
//! This module defines the trait interface for mirror storage backends and
//! associated error types.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid storage path: {0}")]
    InvalidPath(PathBuf),

    #[error("Failed to move {path} into place: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for mirror storage backends
///
/// All paths are relative to the backend's output root. Writes are atomic: a
/// reader never observes a partially written file at its final path.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns true if a file exists at the path
    async fn exists(&self, path: &Path) -> bool;

    /// Returns the modification time of the file, if it exists
    async fn modified(&self, path: &Path) -> Option<SystemTime>;

    /// Reads a whole file
    async fn read(&self, path: &Path) -> StorageResult<Vec<u8>>;

    /// Atomically replaces the file at the path with the given bytes
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Atomically replaces the file at the path with everything read from `reader`
    ///
    /// # Returns
    ///
    /// The number of bytes written
    async fn write_stream(
        &self,
        path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<u64>;

    /// Sets the modification time of an existing file
    async fn set_modified(&self, path: &Path, time: SystemTime) -> StorageResult<()>;
}
