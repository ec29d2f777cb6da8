//! Crawler coordinator - main crawl orchestration logic
//!
//! This module runs the worker pool of a crawl:
//! - Seeding the frontier with the start URL
//! - Spawning the configured number of workers
//! - Filtering discovered references by the crawl scope and host
//! - Stopping every worker on the first fatal error or on cancellation

use crate::config::Config;
use crate::crawler::download::{Disposition, Downloader, WorkResult};
use crate::crawler::parser::ReferenceTag;
use crate::crawler::scheduler::{Frontier, WorkItem};
use crate::crawler::stats::{CrawlStatistics, CrawlStats};
use crate::crawler::throttle::Throttle;
use crate::images::{ImageRecoder, JpegRecoder};
use crate::storage::{open_storage, Store};
use crate::url::parse_http_url;
use crate::{MirrorError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Main crawler structure
///
/// A crawler owns the state of one crawl: the frontier with its processed
/// set, the shared throttle and the statistics. It is created per crawl and
/// dropped afterwards.
pub struct Crawler {
    seed: Url,
    concurrency: usize,
    frontier: Arc<Frontier>,
    downloader: Arc<Downloader>,
    throttle: Arc<Throttle>,
    stats: Arc<CrawlStats>,
}

impl Crawler {
    /// Creates a crawler writing into the configured output directory
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to `start`
    /// * `Err(MirrorError)` - Invalid start URL, patterns or HTTP settings
    pub fn new(config: Config) -> Result<Self> {
        let store = open_storage(Path::new(&config.output.directory));
        Self::with_store(config, store)
    }

    /// Creates a crawler writing into the given store
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        Self::with_parts(config, store, Arc::new(JpegRecoder))
    }

    /// Creates a crawler from its collaborators
    pub fn with_parts(
        config: Config,
        store: Arc<dyn Store>,
        recoder: Arc<dyn ImageRecoder>,
    ) -> Result<Self> {
        let seed = parse_http_url(&config.url)?;

        let throttle = Arc::new(Throttle::from_config(&config.throttle));
        let stats = Arc::new(CrawlStats::new());
        let downloader = Downloader::new(&config, store, throttle.clone(), stats.clone(), recoder)?;

        Ok(Self {
            seed,
            concurrency: config.crawler.concurrency.max(1) as usize,
            frontier: Arc::new(Frontier::new()),
            downloader: Arc::new(downloader),
            throttle,
            stats,
        })
    }

    /// Runs the crawl until no work is left
    ///
    /// # Arguments
    ///
    /// * `cancel` - Stops the crawl when cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every reachable item was processed
    /// * `Err(MirrorError::Cancelled)` - The crawl was cancelled
    /// * `Err(MirrorError)` - The first fatal error of any worker
    pub async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        let started = Instant::now();
        let cancel = cancel.child_token();

        tracing::info!(
            "Mirroring {} into {} with {} worker(s)",
            self.seed,
            self.downloader.mapper().start_host(),
            self.concurrency
        );
        self.frontier.push(WorkItem::new(self.seed.clone(), 0));

        let mut workers = JoinSet::new();
        for id in 0..self.concurrency {
            let worker = Worker {
                id,
                frontier: self.frontier.clone(),
                downloader: self.downloader.clone(),
            };
            workers.spawn(worker.run(cancel.clone()));
        }

        let mut failure: Option<MirrorError> = None;
        let mut cancelled = false;

        while let Some(joined) = workers.join_next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(MirrorError::Cancelled)) => {
                    cancelled = true;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => MirrorError::Worker(e),
            };

            if failure.is_none() {
                tracing::error!("Crawl aborted: {}", error);
                cancel.cancel();
                failure = Some(error);
            } else {
                tracing::debug!("Additional worker error after abort: {}", error);
            }
        }

        tracing::info!(
            "Crawl finished in {:.2}s, {} URLs processed",
            started.elapsed().as_secs_f64(),
            self.frontier.processed().len()
        );
        self.stats.snapshot().log_summary();

        match failure {
            Some(e) => Err(e),
            None if cancelled => Err(MirrorError::Cancelled),
            None => Ok(()),
        }
    }

    /// Sorted keys of every URL dispatched so far
    pub fn processed(&self) -> Vec<String> {
        self.frontier.processed()
    }

    /// Current shared delay between requests
    pub fn throttle_delay(&self) -> Duration {
        self.throttle.current()
    }

    /// Counters of the crawl
    pub fn statistics(&self) -> CrawlStatistics {
        self.stats.snapshot()
    }

    /// Host the mirror is rooted under
    pub fn start_host(&self) -> String {
        self.downloader.mapper().start_host().to_string()
    }
}

struct Worker {
    id: usize,
    frontier: Arc<Frontier>,
    downloader: Arc<Downloader>,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::debug!("Worker {} started", self.id);

        while let Some(item) = self.frontier.next(&cancel).await {
            let processed = match self.downloader.process_url(&cancel, item.clone()).await {
                Ok(processed) => processed,
                Err(e) => {
                    self.frontier.finish(Vec::new(), None);
                    return Err(e);
                }
            };

            if let Some(url) = &processed.effective_url {
                self.frontier.mark_processed(url);
            }

            match processed.disposition {
                Disposition::Completed(result) => {
                    let discovered = self.discover(&result);
                    self.frontier.finish(discovered, None);
                }
                Disposition::Requeue => self.frontier.finish(Vec::new(), Some(item)),
                Disposition::Dropped => self.frontier.finish(Vec::new(), None),
            }
        }

        tracing::debug!("Worker {} stopped", self.id);
        if cancel.is_cancelled() {
            Err(MirrorError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Turns the references of a result into new work items
    fn discover(&self, result: &WorkResult) -> Vec<WorkItem> {
        let mapper = self.downloader.mapper();
        let scope = self.downloader.scope();

        // Resources of other hosts are stored but never followed further
        if mapper.is_external(&result.item.url) {
            return Vec::new();
        }

        let depth = result.item.depth + 1;
        if !scope.allows_depth(depth) {
            tracing::trace!("Not following references of {} (depth limit)", result.item.url);
            return Vec::new();
        }

        result
            .references
            .iter()
            .filter(|r| !(r.tag == ReferenceTag::Anchor && mapper.is_external(&r.url)))
            .filter(|r| scope.follows(&r.url, depth))
            .map(|r| WorkItem::new(r.url.clone(), depth))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::parser::Reference;
    use crate::storage::FsStore;
    use tempfile::TempDir;

    fn worker(config: Config, dir: &TempDir) -> Worker {
        let crawler = Crawler::with_store(config, Arc::new(FsStore::new(dir.path()))).unwrap();
        Worker {
            id: 0,
            frontier: crawler.frontier.clone(),
            downloader: crawler.downloader.clone(),
        }
    }

    fn reference(url: &str, tag: ReferenceTag) -> Reference {
        Reference {
            url: Url::parse(url).unwrap(),
            tag,
        }
    }

    fn result(url: &str, depth: u32, references: Vec<Reference>) -> WorkResult {
        WorkResult {
            item: WorkItem::new(Url::parse(url).unwrap(), depth),
            status: 200,
            references,
        }
    }

    fn base_config() -> Config {
        Config {
            url: "https://example.org/".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_discover_same_host_and_external_assets() {
        let dir = TempDir::new().unwrap();
        let worker = worker(base_config(), &dir);

        let discovered = worker.discover(&result(
            "https://example.org/",
            0,
            vec![
                reference("https://example.org/page2", ReferenceTag::Anchor),
                reference("https://other.net/page", ReferenceTag::Anchor),
                reference("https://cdn.net/logo.png", ReferenceTag::Image),
            ],
        ));

        let urls: Vec<_> = discovered.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.org/page2", "https://cdn.net/logo.png"]);
        assert!(discovered.iter().all(|i| i.depth == 1));
    }

    #[tokio::test]
    async fn test_external_items_are_not_followed() {
        let dir = TempDir::new().unwrap();
        let worker = worker(base_config(), &dir);

        let discovered = worker.discover(&result(
            "https://cdn.net/style.css",
            1,
            vec![reference("https://cdn.net/font.woff", ReferenceTag::Stylesheet)],
        ));
        assert!(discovered.is_empty());
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config();
        config.crawler.max_depth = 1;
        let worker = worker(config, &dir);

        let refs = vec![reference("https://example.org/x", ReferenceTag::Anchor)];
        assert_eq!(worker.discover(&result("https://example.org/", 0, refs.clone())).len(), 1);
        assert!(worker.discover(&result("https://example.org/a", 1, refs)).is_empty());
    }

    #[tokio::test]
    async fn test_include_exclude_patterns() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config();
        config.crawler.includes = vec!["/docs/".to_string()];
        config.crawler.excludes = vec!["\\.pdf$".to_string()];
        let worker = worker(config, &dir);

        let discovered = worker.discover(&result(
            "https://example.org/",
            0,
            vec![
                reference("https://example.org/docs/a", ReferenceTag::Anchor),
                reference("https://example.org/docs/a.pdf", ReferenceTag::Anchor),
                reference("https://example.org/blog/", ReferenceTag::Anchor),
            ],
        ));

        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].url.path(), "/docs/a");
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_rejected() {
        let mut config = base_config();
        config.crawler.excludes = vec!["(".to_string()];
        let dir = TempDir::new().unwrap();

        let result = Crawler::with_store(config, Arc::new(FsStore::new(dir.path())));
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[tokio::test]
    async fn test_rebased_start_host_changes_scope() {
        let dir = TempDir::new().unwrap();
        let worker = worker(base_config(), &dir);
        worker
            .downloader
            .rebase(&Url::parse("https://www.example.org/").unwrap());

        let discovered = worker.discover(&result(
            "https://www.example.org/",
            0,
            vec![
                reference("https://www.example.org/a", ReferenceTag::Anchor),
                reference("https://example.org/b", ReferenceTag::Anchor),
            ],
        ));

        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].url.as_str(), "https://www.example.org/a");
    }
}
