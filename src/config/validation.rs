use crate::config::types::{Config, CrawlerConfig, HttpConfig, ThrottleConfig};
use crate::ConfigError;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_start_url(&config.url)?;
    validate_crawler_config(&config.crawler)?;
    validate_throttle_config(&config.throttle)?;
    validate_http_config(&config.http)?;

    if config.output.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_start_url(url: &str) -> Result<(), ConfigError> {
    let parsed =
        Url::parse(url).map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", url, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "start URL '{}' must use http or https",
            url
        )));
    }

    if parsed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "start URL '{}' has no host",
            url
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be >= 1, got {}",
            config.concurrency
        )));
    }

    if config.tries < 1 {
        return Err(ConfigError::Validation(format!(
            "tries must be >= 1, got {}",
            config.tries
        )));
    }

    if config.retry_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "retry-delay-ms must be > 0".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be > 0".to_string(),
        ));
    }

    if config.image_quality > 100 {
        return Err(ConfigError::Validation(format!(
            "image-quality must be between 0 and 100, got {}",
            config.image_quality
        )));
    }

    for pattern in config.includes.iter().chain(&config.excludes) {
        Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))?;
    }

    Ok(())
}

fn validate_throttle_config(config: &ThrottleConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "throttle min-delay-ms ({}) exceeds max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }
    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    if config.password.is_some() && config.username.is_none() {
        return Err(ConfigError::Validation(
            "password given without username".to_string(),
        ));
    }

    for cookie in &config.cookies {
        if cookie.name.is_empty() {
            return Err(ConfigError::Validation(
                "cookie name cannot be empty".to_string(),
            ));
        }
    }

    make_headers(&config.headers)?;
    Ok(())
}

/// Builds a header map from "Name: value" entries
///
/// Later entries replace earlier ones with the same name.
pub fn make_headers(headers: &[String]) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::new();

    for header in headers {
        let (name, value) = header.split_once(':').ok_or_else(|| {
            ConfigError::Validation(format!("header '{}' must be 'Name: value'", header))
        })?;

        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| ConfigError::Validation(format!("header '{}': {}", header, e)))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| ConfigError::Validation(format!("header '{}': {}", header, e)))?;

        map.insert(name, value);
    }

    Ok(map)
}
