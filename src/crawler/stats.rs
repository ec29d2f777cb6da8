//! Crawl statistics
//!
//! Counters are updated by every worker while the crawl runs and summarized
//! once it ends.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Live counters shared by the workers of one crawl
#[derive(Debug, Default)]
pub struct CrawlStats {
    statuses: Mutex<BTreeMap<u16, u64>>,
    pages_written: AtomicU64,
    assets_written: AtomicU64,
    assets_skipped: AtomicU64,
    bytes_written: AtomicU64,
    not_modified: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of the crawl counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Responses seen per HTTP status code
    pub statuses: BTreeMap<u16, u64>,

    /// Pages stored (including rewritten ones)
    pub pages_written: u64,

    /// Assets stored
    pub assets_written: u64,

    /// Assets not written because the file already existed
    pub assets_skipped: u64,

    /// Total bytes stored
    pub bytes_written: u64,

    /// Responses answered with 304
    pub not_modified: u64,

    /// Items put back on the queue (429, 204)
    pub requeued: u64,

    /// Items given up after a client error
    pub dropped: u64,

    /// Files that could not be written
    pub write_failures: u64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_status(&self, status: u16) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        *statuses.entry(status).or_insert(0) += 1;
    }

    pub fn record_page(&self, bytes: u64) {
        self.pages_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_asset(&self, bytes: u64) {
        self.assets_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_asset_skipped(&self) {
        self.assets_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_modified(&self) {
        self.not_modified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counters
    pub fn snapshot(&self) -> CrawlStatistics {
        CrawlStatistics {
            statuses: self
                .statuses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            pages_written: self.pages_written.load(Ordering::Relaxed),
            assets_written: self.assets_written.load(Ordering::Relaxed),
            assets_skipped: self.assets_skipped.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            not_modified: self.not_modified.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

impl CrawlStatistics {
    /// Total number of HTTP responses
    pub fn responses(&self) -> u64 {
        self.statuses.values().sum()
    }

    /// Logs the summary at the end of a crawl
    pub fn log_summary(&self) {
        tracing::info!("=== Crawl Statistics ===");
        tracing::info!(
            "Responses: {}, pages written: {}, assets written: {} ({} already present)",
            self.responses(),
            self.pages_written,
            self.assets_written,
            self.assets_skipped
        );
        tracing::info!(
            "Bytes written: {}, not modified: {}, re-queued: {}, dropped: {}",
            self.bytes_written,
            self.not_modified,
            self.requeued,
            self.dropped
        );

        if self.write_failures > 0 {
            tracing::warn!("{} files could not be written", self.write_failures);
        }

        for (status, count) in &self.statuses {
            tracing::info!("  HTTP {}: {}", status, count);
        }
    }
}
