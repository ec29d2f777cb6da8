//! Mapping of fetched URLs to local mirror paths
//!
//! Every URL maps deterministically to a path relative to the output root:
//! `<start host>/[_<external host>/]<path>`. Pages are normalized so that
//! directory URLs and extensionless URLs become browsable `.html` files;
//! assets keep their literal URL path.

mod relative;

pub use relative::relative_link;

use crate::url::host_key;
use std::path::{Path, PathBuf};
use url::Url;

/// File extension that downloaded pages get
pub const PAGE_EXTENSION: &str = "html";

/// File name of the index file for every directory
pub const PAGE_DIR_INDEX: &str = "index.html";

/// Prefix marking a directory that holds an external host's files
pub const EXTERNAL_DOMAIN_PREFIX: &str = "_";

/// Maps URLs to relative storage paths for one crawl
///
/// The mapper only depends on the crawl's start host, so mapping the same URL
/// always yields the same path regardless of what has been mapped before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    start_host: String,
}

impl PathMapper {
    /// Creates a mapper for a crawl starting at `start_url`
    pub fn new(start_url: &Url) -> Self {
        Self {
            start_host: host_key(start_url),
        }
    }

    /// The host all mirror paths are rooted under
    pub fn start_host(&self) -> &str {
        &self.start_host
    }

    /// Returns true if the URL is served by a host other than the start host
    pub fn is_external(&self, url: &Url) -> bool {
        host_key(url) != self.start_host
    }

    /// Maps a URL to its path relative to the output root
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to map; fragment and query are ignored
    /// * `is_page` - Whether the URL is stored as a browsable page
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use url::Url;
    /// use sumi_mirror::mapping::PathMapper;
    ///
    /// let mapper = PathMapper::new(&Url::parse("https://example.org/").unwrap());
    ///
    /// let page = Url::parse("https://example.org/docs/").unwrap();
    /// assert_eq!(mapper.map(&page, true), PathBuf::from("example.org/docs/index.html"));
    ///
    /// let asset = Url::parse("https://cdn.net/logo.png").unwrap();
    /// assert_eq!(mapper.map(&asset, false), PathBuf::from("example.org/_cdn.net/logo.png"));
    /// ```
    pub fn map(&self, url: &Url, is_page: bool) -> PathBuf {
        let mut path = PathBuf::from(&self.start_host);

        if self.is_external(url) {
            path.push(format!("{}{}", EXTERNAL_DOMAIN_PREFIX, host_key(url)));
        }

        let file_name = if is_page {
            page_file_path(url.path())
        } else {
            asset_file_path(url.path())
        };

        for segment in file_name.split('/') {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());

            match decoded.as_str() {
                "" | "." | ".." => continue,
                name => path.push(name.replace(['/', '\\'], "_")),
            }
        }

        path
    }
}

/// Returns the file path for a URL path that represents a page
fn page_file_path(url_path: &str) -> String {
    if url_path.is_empty() || url_path == "/" {
        return PAGE_DIR_INDEX.to_string();
    }

    if url_path.ends_with('/') {
        return format!("{}{}", url_path, PAGE_DIR_INDEX);
    }

    let last = url_path.rsplit('/').next().unwrap_or_default();
    if Path::new(last).extension().is_none() {
        format!("{}.{}", url_path, PAGE_EXTENSION)
    } else {
        url_path.to_string()
    }
}

/// Returns the file path for a URL path that represents an asset
///
/// Assets keep their literal path; a directory-like path still needs a file
/// name to be storable.
fn asset_file_path(url_path: &str) -> String {
    if url_path.is_empty() || url_path.ends_with('/') {
        format!("{}{}", url_path, PAGE_DIR_INDEX)
    } else {
        url_path.to_string()
    }
}
