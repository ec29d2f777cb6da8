//! Crawl scope: which discovered URLs become work items
//!
//! The same decision is made twice per page: when its references are turned
//! into work items, and when its links are rewritten. A link only points at
//! a local file if the crawl is going to fetch that file.

use crate::config::CrawlerConfig;
use crate::url::UrlFilter;
use crate::Result;
use url::Url;

/// Depth limit plus include/exclude patterns of a crawl
#[derive(Debug)]
pub struct CrawlScope {
    filter: UrlFilter,
    max_depth: u32,
}

impl CrawlScope {
    pub fn new(filter: UrlFilter, max_depth: u32) -> Self {
        Self { filter, max_depth }
    }

    /// Builds the scope from the crawler settings
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlScope)` - The compiled scope
    /// * `Err(MirrorError::Config)` - An include or exclude pattern is invalid
    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let filter = UrlFilter::new(&config.includes, &config.excludes)?;
        Ok(Self::new(filter, config.max_depth))
    }

    /// Whether items at `depth` may still be fetched; a limit of 0 is unlimited
    pub fn allows_depth(&self, depth: u32) -> bool {
        self.max_depth == 0 || depth <= self.max_depth
    }

    /// Whether a reference found at `depth` is followed
    pub fn follows(&self, url: &Url, depth: u32) -> bool {
        self.allows_depth(depth) && self.filter.matches(url)
    }
}
