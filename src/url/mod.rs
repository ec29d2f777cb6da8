//! URL handling module for Sumi-Mirror
//!
//! This module provides processed-set key derivation, host identity and the
//! include/exclude filter applied to discovered references.

mod domain;
mod matcher;
mod normalize;

// Re-export main functions
pub use domain::{host_key, same_host};
pub use matcher::UrlFilter;
pub use normalize::{parse_http_url, strip_fragment, url_key};

/// Schemes the crawler can fetch
const FETCHABLE_SCHEMES: &[&str] = &["http", "https"];

/// Returns true if the URL's scheme can be fetched
pub fn is_fetchable(url: &::url::Url) -> bool {
    FETCHABLE_SCHEMES.contains(&url.scheme())
}

/// Returns true if a raw attribute value can never name a fetchable resource
///
/// Fragment-only references point into the current document; `data:`,
/// `javascript:`, `mailto:` and `tel:` values carry no separate resource.
pub fn is_inert_reference(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') {
        return true;
    }

    let lower = value.to_ascii_lowercase();
    ["data:", "javascript:", "mailto:", "tel:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}
