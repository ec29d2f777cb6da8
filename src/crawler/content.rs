//! Content-type classification for fetched responses

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use url::Url;

/// What the download pipeline does with a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// HTML or XHTML page: parsed, rewritten, stored as a page
    Html,
    /// Stylesheet: scanned for `url(...)` references
    Css,
    /// Image: optionally re-encoded
    Image,
    /// Anything else: streamed to disk
    Other,
}

impl ContentKind {
    /// Classifies a `Content-Type` header value
    pub fn from_content_type(value: &str) -> Self {
        let media = value
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match media.as_str() {
            "text/html" | "application/xhtml+xml" => ContentKind::Html,
            "text/css" => ContentKind::Css,
            m if m.starts_with("image/") => ContentKind::Image,
            _ => ContentKind::Other,
        }
    }

    /// Classifies a response by its headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(Self::from_content_type)
            .unwrap_or(ContentKind::Other)
    }

    /// Guesses the kind from the URL path
    ///
    /// Used for 304 responses, which usually carry no `Content-Type`.
    /// Directory URLs and extensionless paths are pages.
    pub fn from_url(url: &Url) -> Self {
        let path = url.path();
        let last = path.rsplit('/').next().unwrap_or("");

        let ext = match last.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return ContentKind::Html,
        };

        match ext.as_str() {
            "html" | "htm" | "xhtml" => ContentKind::Html,
            "css" => ContentKind::Css,
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "ico" | "bmp" => ContentKind::Image,
            _ => ContentKind::Other,
        }
    }

    /// Whether the body is stored under the page mapping
    pub fn is_page(self) -> bool {
        self == ContentKind::Html
    }
}
