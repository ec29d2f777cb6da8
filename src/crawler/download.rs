//! Download pipeline
//!
//! One call of [`Downloader::process_url`] fetches a work item, stores what
//! it got and reports the references it found. Responses are dispatched once
//! by content kind:
//!
//! | Kind | Body | Stored as | References |
//! |------|------|-----------|------------|
//! | HTML/XHTML | buffered, links rewritten | page, always replaced | document tags |
//! | CSS | buffered, `url()` rewritten | asset | `url()` values |
//! | Image (recode on) | buffered, re-encoded | asset, no mtime | none |
//! | Other | streamed | asset | none |
//!
//! Assets that already exist in the mirror are never rewritten.

use crate::config::Config;
use crate::crawler::content::ContentKind;
use crate::crawler::css::{css_references, rewrite_css};
use crate::crawler::fetcher::{
    build_http_client, last_modified, transport_error, FetchOutcome, Fetcher,
};
use crate::crawler::parser::{extract_mirrored_references, extract_references, Reference};
use crate::crawler::rewrite::LinkRewriter;
use crate::crawler::scheduler::WorkItem;
use crate::crawler::scope::CrawlScope;
use crate::crawler::stats::CrawlStats;
use crate::crawler::throttle::Throttle;
use crate::images::ImageRecoder;
use crate::mapping::PathMapper;
use crate::storage::{StorageError, Store};
use crate::url::{host_key, same_host, strip_fragment, url_key};
use crate::{MirrorError, Result};
use futures::StreamExt;
use reqwest::Response;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Outcome of processing one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResult {
    /// The item as processed (a redirected seed carries its new URL)
    pub item: WorkItem,

    /// HTTP status of the final response
    pub status: u16,

    /// Absolute, fragment-free URLs found in the content, in document order
    pub references: Vec<Reference>,
}

/// What the scheduler should do with an item after processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished; follow the references
    Completed(WorkResult),
    /// Put the item back to be fetched again later (429, 204)
    Requeue,
    /// The item was given up (client error)
    Dropped,
}

/// Return value of [`Downloader::process_url`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    /// New URL of the seed when the server redirected it
    pub effective_url: Option<Url>,
    pub disposition: Disposition,
}

impl Processed {
    fn completed(item: WorkItem, status: u16, references: Vec<Reference>) -> Self {
        Self {
            effective_url: None,
            disposition: Disposition::Completed(WorkResult {
                item,
                status,
                references,
            }),
        }
    }

    fn without_result(disposition: Disposition) -> Self {
        Self {
            effective_url: None,
            disposition,
        }
    }
}

/// Start URL of the mirror and the path mapper rooted on it
#[derive(Debug, Clone)]
struct Root {
    seed: Url,
    mapper: PathMapper,
}

impl Root {
    fn new(seed: &Url) -> Self {
        Self {
            seed: strip_fragment(seed),
            mapper: PathMapper::new(seed),
        }
    }
}

/// Fetches, stores and indexes the items of one crawl
pub struct Downloader {
    fetcher: Fetcher,
    store: Arc<dyn Store>,
    scope: CrawlScope,
    root: RwLock<Root>,
    recoder: Arc<dyn ImageRecoder>,
    image_quality: u8,
    claims: tokio::sync::Mutex<HashSet<PathBuf>>,
    stats: Arc<CrawlStats>,
}

impl Downloader {
    /// Creates the pipeline for a crawl
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration
    /// * `store` - Where mirrored files go
    /// * `throttle` - The crawl's shared throttle
    /// * `stats` - The crawl's counters
    /// * `recoder` - Image transform used when image quality is not 0
    ///
    /// # Returns
    ///
    /// * `Ok(Downloader)` - Ready to process items
    /// * `Err(MirrorError)` - Invalid start URL, patterns or HTTP settings
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        throttle: Arc<Throttle>,
        stats: Arc<CrawlStats>,
        recoder: Arc<dyn ImageRecoder>,
    ) -> Result<Self> {
        let start_url = Url::parse(&config.url)?;
        let client = build_http_client(config)?;

        Ok(Self {
            fetcher: Fetcher::new(client, throttle, stats.clone(), config),
            store,
            scope: CrawlScope::from_config(&config.crawler)?,
            root: RwLock::new(Root::new(&start_url)),
            recoder,
            image_quality: config.crawler.image_quality,
            claims: tokio::sync::Mutex::new(HashSet::new()),
            stats,
        })
    }

    /// Current path mapper
    pub fn mapper(&self) -> PathMapper {
        self.root().mapper
    }

    /// Which references the crawl follows
    pub fn scope(&self) -> &CrawlScope {
        &self.scope
    }

    /// Re-roots the mirror on a new start URL
    pub fn rebase(&self, start_url: &Url) {
        let root = Root::new(start_url);
        tracing::info!("Mirror root is now {}", root.mapper.start_host());
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = root;
    }

    fn root(&self) -> Root {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Processes one work item
    ///
    /// Aborts with [`MirrorError::Cancelled`] as soon as `cancel` fires; a
    /// write in progress at that moment is discarded without touching the
    /// destination file.
    ///
    /// # Returns
    ///
    /// * `Ok(Processed)` - The item was handled (including 4xx drops and re-queues)
    /// * `Err(MirrorError)` - A failure that aborts the crawl
    pub async fn process_url(&self, cancel: &CancellationToken, item: WorkItem) -> Result<Processed> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MirrorError::Cancelled),
            result = self.process(item) => result,
        }
    }

    async fn process(&self, item: WorkItem) -> Result<Processed> {
        let since = self.local_timestamp(&item.url).await;

        match self.fetcher.fetch(&item.url, since).await? {
            FetchOutcome::RateLimited => {
                self.stats.record_requeue();
                Ok(Processed::without_result(Disposition::Requeue))
            }
            FetchOutcome::NoContent => {
                tracing::debug!("No content for {}, re-queueing", item.url);
                self.stats.record_requeue();
                Ok(Processed::without_result(Disposition::Requeue))
            }
            FetchOutcome::ClientError(status) => {
                tracing::warn!("Dropping {} after HTTP {}", item.url, status);
                self.stats.record_dropped();
                Ok(Processed::without_result(Disposition::Dropped))
            }
            FetchOutcome::NotModified(response) => {
                self.stats.record_not_modified();
                let (item, effective_url) = self.follow_redirect(item, &response);
                let references = self.not_modified(&item, &response).await?;

                let mut processed = Processed::completed(item, 304, references);
                processed.effective_url = effective_url;
                Ok(processed)
            }
            FetchOutcome::Success(response) => {
                let status = response.status().as_u16();
                let (item, effective_url) = self.follow_redirect(item, &response);
                let references = self.success(&item, response).await?;

                let mut processed = Processed::completed(item, status, references);
                processed.effective_url = effective_url;
                Ok(processed)
            }
        }
    }

    /// Adopts the redirected URL of the seed item
    fn follow_redirect(&self, mut item: WorkItem, response: &Response) -> (WorkItem, Option<Url>) {
        let final_url = strip_fragment(response.url());
        if item.depth != 0 || url_key(&final_url) == url_key(&item.url) {
            return (item, None);
        }

        tracing::info!("Start page {} redirected to {}", item.url, final_url);
        if !same_host(&item.url, &final_url) {
            tracing::info!("Mirror root moves to host {}", host_key(&final_url));
        }
        self.rebase(&final_url);
        item.url = final_url.clone();
        (item, Some(final_url))
    }

    /// Modification time of the local copy, page mapping first
    async fn local_timestamp(&self, url: &Url) -> Option<SystemTime> {
        let mapper = self.mapper();

        for is_page in [true, false] {
            if let Some(time) = self.store.modified(&mapper.map(url, is_page)).await {
                return Some(time);
            }
        }
        None
    }

    async fn success(&self, item: &WorkItem, response: Response) -> Result<Vec<Reference>> {
        let url = &item.url;
        let modified = last_modified(response.headers());

        match ContentKind::from_headers(response.headers()) {
            ContentKind::Html => {
                let base = response.url().clone();
                let body = read_body(url, response).await?;
                self.store_page(item, &base, &body, modified).await
            }
            ContentKind::Css => {
                let base = response.url().clone();
                let body = read_body(url, response).await?;
                self.store_css(item, &base, &body, modified).await
            }
            ContentKind::Image if self.image_quality != 0 => {
                let body = read_body(url, response).await?;
                self.store_image(item, body).await?;
                Ok(Vec::new())
            }
            ContentKind::Image | ContentKind::Other => {
                self.stream_asset(item, response, modified).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn store_page(
        &self,
        item: &WorkItem,
        base: &Url,
        body: &[u8],
        modified: Option<SystemTime>,
    ) -> Result<Vec<Reference>> {
        let Root { seed, mapper } = self.root();
        let path = mapper.map(&item.url, true);

        // Links of an off-host page are never followed from it
        let depth = item.depth + 1;
        let on_start_host = !mapper.is_external(&item.url);
        let followed = |url: &Url| {
            url_key(url) == url_key(&seed) || (on_start_host && self.scope.follows(url, depth))
        };

        let references = extract_references(body, base);
        let rewritten = LinkRewriter::new(base, &path, &mapper)
            .following(followed)
            .rewrite(body)
            .map_err(|message| MirrorError::HtmlParse {
                url: item.url.to_string(),
                message,
            })?;
        let data = rewritten.as_deref().unwrap_or(body);

        match self.store.write_atomic(&path, data).await {
            Ok(()) => {
                tracing::debug!("Stored page {} as {}", item.url, path.display());
                self.stats.record_page(data.len() as u64);
                self.apply_modified(&path, modified).await;
            }
            Err(e) => self.write_failed(&path, e),
        }

        Ok(references)
    }

    async fn store_css(
        &self,
        item: &WorkItem,
        base: &Url,
        body: &[u8],
        modified: Option<SystemTime>,
    ) -> Result<Vec<Reference>> {
        let mapper = self.mapper();
        let path = mapper.map(&item.url, false);

        let references = css_references(body, base);
        if self.claim(&path).await {
            let rewritten = rewrite_css(body, base, &path, &mapper);
            let data = rewritten.as_deref().unwrap_or(body);
            self.write_asset(&path, data, modified).await;
        }

        Ok(references)
    }

    async fn store_image(&self, item: &WorkItem, body: Vec<u8>) -> Result<()> {
        let path = self.mapper().map(&item.url, false);
        if !self.claim(&path).await {
            return Ok(());
        }

        let recoder = self.recoder.clone();
        let quality = self.image_quality;
        let data = tokio::task::spawn_blocking(move || recoder.recode(&body, quality)).await?;

        // Re-encoded bytes no longer match the server's timestamp
        self.write_asset(&path, &data, None).await;
        Ok(())
    }

    async fn stream_asset(
        &self,
        item: &WorkItem,
        response: Response,
        modified: Option<SystemTime>,
    ) -> Result<()> {
        let path = self.mapper().map(&item.url, false);
        if !self.claim(&path).await {
            return Ok(());
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        let mut reader = StreamReader::new(Box::pin(stream));

        match self.store.write_stream(&path, &mut reader).await {
            Ok(written) => {
                tracing::debug!("Stored {} ({} bytes)", path.display(), written);
                self.stats.record_asset(written);
                self.apply_modified(&path, modified).await;
            }
            Err(StorageError::Io(e)) if is_body_error(&e) => {
                return Err(body_error(&item.url, e));
            }
            Err(e) => self.write_failed(&path, e),
        }
        Ok(())
    }

    /// Claims an asset path for writing
    ///
    /// Returns false if the file already exists or another worker claimed it.
    async fn claim(&self, path: &Path) -> bool {
        let mut claims = self.claims.lock().await;
        if claims.contains(path) || self.store.exists(path).await {
            tracing::trace!("Asset {} already present", path.display());
            self.stats.record_asset_skipped();
            return false;
        }
        claims.insert(path.to_path_buf());
        true
    }

    async fn write_asset(&self, path: &Path, data: &[u8], modified: Option<SystemTime>) {
        match self.store.write_atomic(path, data).await {
            Ok(()) => {
                tracing::debug!("Stored {} ({} bytes)", path.display(), data.len());
                self.stats.record_asset(data.len() as u64);
                self.apply_modified(path, modified).await;
            }
            Err(e) => self.write_failed(path, e),
        }
    }

    async fn apply_modified(&self, path: &Path, modified: Option<SystemTime>) {
        if let Some(time) = modified {
            if let Err(e) = self.store.set_modified(path, time).await {
                tracing::warn!("Could not set modification time of {}: {}", path.display(), e);
            }
        }
    }

    fn write_failed(&self, path: &Path, error: StorageError) {
        tracing::error!("Writing {} failed: {}", path.display(), error);
        self.stats.record_write_failure();
    }

    /// Re-derives references from the local copy after a 304
    async fn not_modified(&self, item: &WorkItem, response: &Response) -> Result<Vec<Reference>> {
        let kind = match response.headers().get(reqwest::header::CONTENT_TYPE) {
            Some(_) => ContentKind::from_headers(response.headers()),
            None => ContentKind::from_url(&item.url),
        };
        if !matches!(kind, ContentKind::Html | ContentKind::Css) {
            return Ok(Vec::new());
        }
        let is_page = kind.is_page();

        let path = self.mapper().map(&item.url, is_page);
        let data = match self.store.read(&path).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(
                    "{} not modified but {} is missing locally",
                    item.url,
                    path.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(if is_page {
            extract_mirrored_references(&data, &item.url)
        } else {
            css_references(&data, &item.url)
        })
    }
}

async fn read_body(url: &Url, response: Response) -> Result<Vec<u8>> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(url, e))?;
    Ok(bytes.to_vec())
}

/// Whether a streaming write failed on the network side
fn is_body_error(error: &io::Error) -> bool {
    error
        .get_ref()
        .map_or(false, |inner| inner.is::<reqwest::Error>())
}

fn body_error(url: &Url, error: io::Error) -> MirrorError {
    let kind = error.kind();
    match error.into_inner().map(|inner| inner.downcast::<reqwest::Error>()) {
        Some(Ok(source)) => transport_error(url, *source),
        _ => MirrorError::Io(io::Error::new(kind, format!("reading body of {} failed", url))),
    }
}
