//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client (user agent, timeout, cookies, proxy, headers)
//! - Conditional GET requests with `If-Modified-Since`
//! - Retry with backoff for server errors
//! - Throttle feedback from every response
//! - Response status classification

use crate::config::{make_headers, Config};
use crate::crawler::retry::{RetryPolicy, RetryState};
use crate::crawler::stats::CrawlStats;
use crate::crawler::throttle::Throttle;
use crate::MirrorError;
use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, Proxy, Response, StatusCode};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use url::Url;

/// Classified outcome of a fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx with a body to store
    Success(Response),

    /// 304, the local copy is current
    NotModified(Response),

    /// 429, the item should be tried again later
    RateLimited,

    /// 204, the item should be tried again later
    NoContent,

    /// 4xx other than 429, the item is dropped
    ClientError(u16),
}

/// Builds an HTTP client from the crawl configuration
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(MirrorError)` - Invalid proxy, header or client settings
pub fn build_http_client(config: &Config) -> Result<Client, MirrorError> {
    let start_url = Url::parse(&config.url)?;
    let http = &config.http;

    let jar = Arc::new(Jar::default());
    for cookie in &http.cookies {
        jar.add_cookie_str(&cookie_string(&cookie.name, &cookie.value, cookie.expires), &start_url);
    }

    let mut builder = Client::builder()
        .user_agent(http.user_agent.clone())
        .timeout(config.crawler.timeout())
        .default_headers(make_headers(&http.headers)?)
        .cookie_provider(jar)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &http.proxy {
        let proxy = Proxy::all(proxy).map_err(|e| MirrorError::Http {
            url: proxy.clone(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| MirrorError::Http {
        url: config.url.clone(),
        source: e,
    })
}

/// Formats a configured cookie as a `Set-Cookie` value
fn cookie_string(name: &str, value: &str, expires: Option<DateTime<Utc>>) -> String {
    match expires {
        Some(expires) => format!(
            "{}={}; Expires={}",
            name,
            value,
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ),
        None => format!("{}={}", name, value),
    }
}

/// Formats a timestamp as an HTTP date
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Reads the `Last-Modified` header of a response
pub fn last_modified(headers: &HeaderMap) -> Option<SystemTime> {
    let value = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    match DateTime::parse_from_rfc2822(value) {
        Ok(time) => Some(time.into()),
        Err(e) => {
            tracing::debug!("Ignoring invalid Last-Modified {:?}: {}", value, e);
            None
        }
    }
}

/// Maps a transport error to the crawl error it aborts with
pub(crate) fn transport_error(url: &Url, error: reqwest::Error) -> MirrorError {
    if error.is_timeout() {
        MirrorError::Timeout {
            url: url.to_string(),
        }
    } else {
        MirrorError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}

/// Performs the GET requests of a crawl
///
/// Every attempt first waits for the shared throttle. Server errors are
/// retried with growing backoff; a timeout or any other transport error ends
/// the fetch immediately without using another attempt.
pub struct Fetcher {
    client: Client,
    throttle: Arc<Throttle>,
    stats: Arc<CrawlStats>,
    policy: RetryPolicy,
    credentials: Option<(String, Option<String>)>,
}

impl Fetcher {
    pub fn new(client: Client, throttle: Arc<Throttle>, stats: Arc<CrawlStats>, config: &Config) -> Self {
        Self {
            client,
            throttle,
            stats,
            policy: RetryPolicy::new(config.crawler.tries, config.crawler.retry_delay()),
            credentials: config
                .http
                .username
                .clone()
                .map(|user| (user, config.http.password.clone())),
        }
    }

    /// Fetches a URL
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `if_modified_since` - Modification time of the local copy, if any
    ///
    /// # Returns
    ///
    /// * `Ok(FetchOutcome)` - A handled HTTP outcome
    /// * `Err(MirrorError)` - Transport failure, timeout, retries exhausted
    ///   or an unexpected status; all of these abort the crawl
    pub async fn fetch(
        &self,
        url: &Url,
        if_modified_since: Option<SystemTime>,
    ) -> Result<FetchOutcome, MirrorError> {
        let mut state = self.policy.start();
        let mut last_status = 0;

        loop {
            match state {
                RetryState::Attempting { attempt, .. } => {
                    self.throttle.sleep().await;

                    let started = Instant::now();
                    let response = self.send(url, if_modified_since).await?;
                    let status = response.status();
                    self.log_response(url, status, started);

                    if status.is_server_error() {
                        tracing::debug!("Attempt {} for {} failed with {}", attempt, url, status);
                        last_status = status.as_u16();
                        state = self.policy.on_server_error(state);
                        continue;
                    }

                    let outcome = self.classify(url, response)?;
                    if matches!(outcome, FetchOutcome::RateLimited) {
                        // Wait out the slower pace before the item is re-queued
                        self.throttle.sleep().await;
                    }
                    return Ok(outcome);
                }
                RetryState::Backoff { attempt, delay } => {
                    tracing::warn!(
                        "Retrying {} after attempt {} in {:?}",
                        url,
                        attempt,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    state = self.policy.after_backoff(state);
                }
                RetryState::Terminal => {
                    return Err(MirrorError::RetriesExhausted {
                        url: url.to_string(),
                        status: last_status,
                    });
                }
            }
        }
    }

    async fn send(
        &self,
        url: &Url,
        if_modified_since: Option<SystemTime>,
    ) -> Result<Response, MirrorError> {
        let mut request = self.client.get(url.clone());

        if let Some(time) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, http_date(time));
        }
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, password.as_ref());
        }

        request.send().await.map_err(|e| transport_error(url, e))
    }

    fn log_response(&self, url: &Url, status: StatusCode, started: Instant) {
        self.stats.record_status(status.as_u16());
        let took = started.elapsed();

        if status.as_u16() >= 400 {
            tracing::warn!(url = %url, status = status.as_u16(), took = ?took, "Fetched");
        } else {
            tracing::info!(url = %url, status = status.as_u16(), took = ?took, "Fetched");
        }
    }

    fn classify(&self, url: &Url, response: Response) -> Result<FetchOutcome, MirrorError> {
        let status = response.status();

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                self.throttle.slow_down();
                Ok(FetchOutcome::RateLimited)
            }
            StatusCode::NO_CONTENT => Ok(FetchOutcome::NoContent),
            StatusCode::NOT_MODIFIED => {
                self.throttle.speed_up();
                Ok(FetchOutcome::NotModified(response))
            }
            s if s.is_success() => {
                self.throttle.speed_up();
                Ok(FetchOutcome::Success(response))
            }
            s if s.is_client_error() => Ok(FetchOutcome::ClientError(s.as_u16())),
            s => Err(MirrorError::UnexpectedStatus {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}
