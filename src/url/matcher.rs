use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Include/exclude filter over a URL's host and path
///
/// A URL passes when it matches at least one include pattern (or no include
/// patterns are configured) and matches none of the exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl UrlFilter {
    /// Compiles the configured patterns
    ///
    /// # Examples
    ///
    /// ```
    /// use url::Url;
    /// use sumi_mirror::url::UrlFilter;
    ///
    /// let filter = UrlFilter::new(&["/docs/".to_string()], &["\\.pdf$".to_string()]).unwrap();
    ///
    /// assert!(filter.matches(&Url::parse("https://x.org/docs/intro").unwrap()));
    /// assert!(!filter.matches(&Url::parse("https://x.org/docs/manual.pdf").unwrap()));
    /// assert!(!filter.matches(&Url::parse("https://x.org/blog/").unwrap()));
    /// ```
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Checks whether a URL is allowed by the filter
    pub fn matches(&self, url: &Url) -> bool {
        let subject = format!("{}{}", url.host_str().unwrap_or_default(), url.path());

        if !self.includes.is_empty() && !self.includes.iter().any(|re| re.is_match(&subject)) {
            return false;
        }

        !self.excludes.iter().any(|re| re.is_match(&subject))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e))))
        .collect()
}
