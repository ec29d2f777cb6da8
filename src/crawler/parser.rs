//! HTML parser for extracting references
//!
//! This module finds every URL a page needs to be mirrored:
//! - `<a href>` links to other pages
//! - `<link href>` stylesheets, icons and alternates
//! - `<script src>` scripts
//! - `<body background>` inline backgrounds
//! - `<img src>` and `<img srcset>` images
//!
//! Categories are visited in that fixed order and every URL is resolved to an
//! absolute URL with its fragment removed.

use crate::url::{is_fetchable, is_inert_reference, strip_fragment};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Prefix of the attributes that record where a rewritten link pointed
pub(crate) const ORIGIN_ATTR_PREFIX: &str = "data-origin-";

/// Element category a reference was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceTag {
    Anchor,
    Link,
    Script,
    Body,
    Image,
    /// `url(...)` inside a stylesheet
    Stylesheet,
}

impl ReferenceTag {
    /// Document tag categories in extraction order
    pub const DOCUMENT_ORDER: [ReferenceTag; 5] = [
        ReferenceTag::Anchor,
        ReferenceTag::Link,
        ReferenceTag::Script,
        ReferenceTag::Body,
        ReferenceTag::Image,
    ];

    /// CSS selector and attribute holding the URL
    pub(crate) fn selectors(self) -> &'static [(&'static str, &'static str)] {
        match self {
            ReferenceTag::Anchor => &[("a[href]", "href")],
            ReferenceTag::Link => &[("link[href]", "href")],
            ReferenceTag::Script => &[("script[src]", "src")],
            ReferenceTag::Body => &[("body[background]", "background")],
            ReferenceTag::Image => &[("img[src]", "src"), ("img[srcset]", "srcset")],
            ReferenceTag::Stylesheet => &[],
        }
    }

    /// Whether the target is stored under the page mapping
    pub fn is_page(self) -> bool {
        self == ReferenceTag::Anchor
    }
}

/// A URL discovered in a fetched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Absolute URL without fragment
    pub url: Url,
    pub tag: ReferenceTag,
}

/// Parses a document and extracts its references in tag order
///
/// # Arguments
///
/// * `html` - The raw page bytes; invalid UTF-8 is replaced
/// * `base_url` - The URL relative references are resolved against
///
/// # Example
///
/// ```
/// use sumi_mirror::crawler::{extract_references, ReferenceTag};
/// use url::Url;
///
/// let html = br#"<html><body><img src="a.png"><a href="/page#top">x</a></body></html>"#;
/// let base = Url::parse("https://example.org/docs/").unwrap();
/// let refs = extract_references(html, &base);
///
/// assert_eq!(refs[0].url.as_str(), "https://example.org/page");
/// assert_eq!(refs[0].tag, ReferenceTag::Anchor);
/// assert_eq!(refs[1].url.as_str(), "https://example.org/docs/a.png");
/// ```
pub fn extract_references(html: &[u8], base_url: &Url) -> Vec<Reference> {
    collect_references(html, base_url, false)
}

/// Extracts the references of a page stored in the mirror
///
/// Rewritten links keep the URL they were rewritten from in a
/// `data-origin-*` attribute; that URL is used instead of the local link so
/// the live site is what gets crawled.
pub fn extract_mirrored_references(html: &[u8], page_url: &Url) -> Vec<Reference> {
    collect_references(html, page_url, true)
}

fn collect_references(html: &[u8], base_url: &Url, mirrored: bool) -> Vec<Reference> {
    let document = Html::parse_document(&String::from_utf8_lossy(html));

    ReferenceTag::DOCUMENT_ORDER
        .iter()
        .flat_map(|&tag| {
            tag_urls(&document, tag, base_url, mirrored)
                .into_iter()
                .map(move |url| Reference { url, tag })
        })
        .collect()
}

/// Finds the URLs of one tag category in a parsed document
pub fn find_tag_urls(document: &Html, tag: ReferenceTag, base_url: &Url) -> Vec<Url> {
    tag_urls(document, tag, base_url, false)
}

fn tag_urls(document: &Html, tag: ReferenceTag, base_url: &Url, mirrored: bool) -> Vec<Url> {
    let mut urls = Vec::new();

    for &(css, attr) in tag.selectors() {
        let selector = match Selector::parse(css) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Invalid selector {}: {:?}", css, e);
                continue;
            }
        };

        for element in document.select(&selector) {
            for value in attribute_values(&element, attr, mirrored) {
                if let Some(url) = resolve_reference(value, base_url) {
                    urls.push(strip_fragment(&url));
                }
            }
        }
    }

    urls
}

/// Name of the attribute holding the live URL of a rewritten `attr`
pub(crate) fn origin_attr(attr: &str) -> String {
    format!("{}{}", ORIGIN_ATTR_PREFIX, attr)
}

/// Splits an attribute into its URL values (one, or several for `srcset`)
fn attribute_values<'a>(element: &ElementRef<'a>, attr: &str, mirrored: bool) -> Vec<&'a str> {
    let origin = mirrored
        .then(|| element.value().attr(&origin_attr(attr)))
        .flatten();
    let Some(value) = origin.or_else(|| element.value().attr(attr)) else {
        return Vec::new();
    };

    if attr == "srcset" {
        srcset_urls(value)
    } else {
        vec![value]
    }
}

/// Returns the URL part of every `srcset` candidate
pub(crate) fn srcset_urls(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .collect()
}

/// Resolves an attribute value against the page URL
///
/// Returns None for values that never name a fetchable resource. Values
/// that fail to parse are logged and skipped.
pub(crate) fn resolve_reference(value: &str, base_url: &Url) -> Option<Url> {
    let value = value.trim();
    if is_inert_reference(value) {
        return None;
    }

    match base_url.join(value) {
        Ok(url) if is_fetchable(&url) => Some(url),
        Ok(url) => {
            tracing::trace!("Skipping non-http reference {}", url);
            None
        }
        Err(e) => {
            tracing::warn!("Skipping unparsable reference {:?} on {}: {}", value, base_url, e);
            None
        }
    }
}
