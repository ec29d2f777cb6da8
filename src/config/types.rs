use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Mirror
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Seed URL the crawl starts from
    pub url: String,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of concurrent downloads
    pub concurrency: u32,

    /// Maximum link depth from the seed, 0 for unlimited
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Regexes a URL's host and path must match to be followed
    pub includes: Vec<String>,

    /// Regexes that exclude a URL's host and path from the crawl
    pub excludes: Vec<String>,

    /// Download attempts per URL when the server answers with 5xx
    pub tries: u32,

    /// Initial retry delay (milliseconds), grows exponentially
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Time limit for each HTTP request (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// JPEG quality from 1 to 100, 0 disables re-encoding
    #[serde(rename = "image-quality")]
    pub image_quality: u8,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_depth: 0,
            includes: Vec::new(),
            excludes: Vec::new(),
            tries: 1,
            retry_delay_ms: 5000,
            timeout_secs: 30,
            image_quality: 0,
        }
    }
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Shared request throttle configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Lowest delay before each request (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Highest delay before each request (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Delay applied by the first slow-down from a near-zero delay (milliseconds)
    #[serde(rename = "step-ms")]
    pub step_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 30_000,
            step_ms: 250,
        }
    }
}

/// HTTP client identification and credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Proxy URL used for all requests
    pub proxy: Option<String>,

    /// Basic authentication user name
    pub username: Option<String>,

    /// Basic authentication password
    pub password: Option<String>,

    /// Extra request headers in "Name: value" form
    pub headers: Vec<String>,

    /// Cookies preloaded into the cookie jar for the start URL
    pub cookies: Vec<CookieEntry>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("sumi-mirror/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
            username: None,
            password: None,
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }
}

/// A cookie to send with every request to the start host
#[derive(Debug, Clone, Deserialize)]
pub struct CookieEntry {
    pub name: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory of the mirror
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_string(),
        }
    }
}
