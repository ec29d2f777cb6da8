//! Crawler module for mirroring a website
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry and an adaptive shared throttle
//! - Reference extraction from HTML and CSS
//! - Link rewriting so the mirror works offline
//! - The shared frontier with its processed set
//! - Overall crawl coordination

mod content;
mod coordinator;
mod css;
mod download;
mod fetcher;
mod parser;
mod retry;
mod rewrite;
mod scheduler;
mod scope;
mod stats;
mod throttle;

pub use content::ContentKind;
pub use coordinator::Crawler;
pub use css::{css_references, rewrite_css};
pub use download::{Disposition, Downloader, Processed, WorkResult};
pub use fetcher::{build_http_client, http_date, last_modified, FetchOutcome, Fetcher};
pub use parser::{
    extract_mirrored_references, extract_references, find_tag_urls, Reference, ReferenceTag,
};
pub use retry::{RetryPolicy, RetryState};
pub use rewrite::LinkRewriter;
pub use scheduler::{Frontier, WorkItem};
pub use scope::CrawlScope;
pub use stats::{CrawlStatistics, CrawlStats};
pub use throttle::Throttle;

use crate::config::Config;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the output directory
/// 2. Build the HTTP client
/// 3. Fetch the start URL and everything reachable from it
/// 4. Log a summary
///
/// # Arguments
///
/// * `config` - The crawl configuration
/// * `cancel` - Stops the crawl when cancelled
pub async fn crawl(config: Config, cancel: &CancellationToken) -> Result<CrawlStatistics> {
    let crawler = Crawler::new(config)?;
    crawler.start(cancel).await?;
    Ok(crawler.statistics())
}
