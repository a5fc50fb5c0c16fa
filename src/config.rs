//! Runtime configuration.
//!
//! Defaults come from the crate constants; [`Config::from_env`] lets every value be
//! overridden through a `GHG_*` environment variable.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryConfig;
use crate::{
    Error, Result, BASE_URL, DISCOVERY_URL, MAX_CONCURRENT_REQUESTS, MAX_ROWS, MAX_WINDOW, OUTPUT_DIR,
    REQUEST_FORMAT, REQUEST_TIMEOUT_SECS, TABLE_MARKER,
};

#[derive(Debug, Clone)]
pub struct Config {
    /// Pages scraped for table names.
    pub discovery_urls: Vec<String>,
    /// Root of the count and rows endpoints, without a trailing slash.
    pub base_url: String,
    pub table_marker: String,
    /// Format segment of the rows endpoint, also used as the file extension.
    pub format: String,
    pub max_window: u64,
    /// Counts above this are reported as failures for their table.
    pub max_rows: u64,
    /// Upper bound on in-flight requests across all stages.
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
    pub retry: RetryConfig,
    /// When set, the output directory is uploaded to this bucket after the run.
    pub bucket: Option<String>,
    pub bucket_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_urls: vec![DISCOVERY_URL.to_string()],
            base_url: BASE_URL.to_string(),
            table_marker: TABLE_MARKER.to_string(),
            format: REQUEST_FORMAT.to_string(),
            max_window: MAX_WINDOW,
            max_rows: MAX_ROWS,
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            output_dir: PathBuf::from(OUTPUT_DIR),
            retry: RetryConfig::default(),
            bucket: None,
            bucket_root: PathBuf::from("buckets"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, so overrides can be tested
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(urls) = lookup("GHG_DISCOVERY_URLS") {
            config.discovery_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(base) = lookup("GHG_BASE_URL") {
            config.base_url = base;
        }
        if let Some(format) = lookup("GHG_FORMAT") {
            config.format = format;
        }
        if let Some(window) = lookup("GHG_MAX_WINDOW") {
            config.max_window = parse_var("GHG_MAX_WINDOW", &window)?;
        }
        if let Some(rows) = lookup("GHG_MAX_ROWS") {
            config.max_rows = parse_var("GHG_MAX_ROWS", &rows)?;
        }
        if let Some(limit) = lookup("GHG_CONCURRENCY") {
            config.max_concurrent_requests = parse_var("GHG_CONCURRENCY", &limit)?;
        }
        if let Some(secs) = lookup("GHG_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_var("GHG_TIMEOUT_SECS", &secs)?);
        }
        if let Some(dir) = lookup("GHG_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(attempts) = lookup("GHG_RETRY_ATTEMPTS") {
            config.retry.max_attempts = parse_var("GHG_RETRY_ATTEMPTS", &attempts)?;
        }
        config.bucket = lookup("GHG_BUCKET").filter(|b| !b.trim().is_empty());
        if let Some(root) = lookup("GHG_BUCKET_ROOT") {
            config.bucket_root = PathBuf::from(root);
        }

        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_window == 0 {
            return Err(Error::config("max_window", "must be at least 1"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::config("max_concurrent_requests", "must be at least 1"));
        }
        if self.format.is_empty() || self.format.contains('/') {
            return Err(Error::config("format", "must be a single path segment"));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(key, format!("cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.max_window, 10_000);
        assert_eq!(config.format, "csv");
        assert_eq!(config.discovery_urls, vec![DISCOVERY_URL.to_string()]);
        assert!(config.bucket.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("GHG_DISCOVERY_URLS", "http://a/page, http://b/page,"),
            ("GHG_BASE_URL", "http://localhost:8080/efservice/"),
            ("GHG_MAX_WINDOW", "500"),
            ("GHG_MAX_ROWS", "2000000"),
            ("GHG_CONCURRENCY", "4"),
            ("GHG_BUCKET", "ghg-data"),
        ]))
        .unwrap();

        assert_eq!(config.discovery_urls, vec!["http://a/page", "http://b/page"]);
        assert_eq!(config.base_url, "http://localhost:8080/efservice");
        assert_eq!(config.max_window, 500);
        assert_eq!(config.max_rows, 2_000_000);
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.bucket.as_deref(), Some("ghg-data"));
    }

    #[test]
    fn rejects_zero_window_and_garbage_numbers() {
        let zero = Config::from_lookup(lookup_from(&[("GHG_MAX_WINDOW", "0")]));
        assert!(matches!(zero, Err(Error::Config { ref key, .. }) if key == "max_window"));

        let garbage = Config::from_lookup(lookup_from(&[("GHG_CONCURRENCY", "lots")]));
        assert!(matches!(garbage, Err(Error::Config { ref key, .. }) if key == "GHG_CONCURRENCY"));
    }
}
