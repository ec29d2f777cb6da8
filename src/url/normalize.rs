use crate::{UrlError, UrlResult};
use url::Url;

/// Returns the URL with its fragment removed
///
/// Two references that only differ by fragment address the same resource.
pub fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// Derives the processed-set key for a URL
///
/// The key is scheme, host, port, path and query; the fragment never takes
/// part in deduplication.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::url_key;
///
/// let a = Url::parse("https://example.org/#a").unwrap();
/// let b = Url::parse("https://example.org/#b").unwrap();
/// assert_eq!(url_key(&a), url_key(&b));
/// assert_eq!(url_key(&a), "https://example.org/");
/// ```
pub fn url_key(url: &Url) -> String {
    strip_fragment(url).into()
}

/// Parses a URL and checks that it can be fetched over HTTP
pub fn parse_http_url(input: &str) -> UrlResult<Url> {
    let url = Url::parse(input.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost(input.to_string()));
    }

    Ok(url)
}
