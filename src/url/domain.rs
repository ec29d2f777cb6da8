use url::Url;

/// Returns the host of a URL including an explicit port
///
/// This is the identity used to tell the start host apart from external
/// hosts, and the directory name the host's files are stored under.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::host_key;
///
/// let url = Url::parse("https://Example.COM/path").unwrap();
/// assert_eq!(host_key(&url), "example.com");
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), "127.0.0.1:8080");
/// ```
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Checks whether two URLs are served by the same host
pub fn same_host(a: &Url, b: &Url) -> bool {
    host_key(a) == host_key(b)
}
