//! Storage module for the mirror's files
//!
//! This module provides the byte-addressable file store the download
//! pipeline writes into:
//! - Existence and modification-time checks for conditional requests
//! - Atomic whole-buffer and streaming writes
//! - Modification-time propagation from `Last-Modified`

mod fs;
mod traits;

pub use fs::FsStore;
pub use traits::{StorageError, StorageResult, Store};

use std::path::Path;
use std::sync::Arc;

/// Opens the filesystem store for an output directory
pub fn open_storage(directory: &Path) -> Arc<dyn Store> {
    Arc::new(FsStore::new(directory))
}
