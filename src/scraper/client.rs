//! Blocking HTTP client for the one page fetch a pipeline run makes. No retries.

use crate::scraper::ScraperError;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Blocking HTTP client with a browser-like User-Agent and a bounded timeout.
#[derive(Debug)]
pub struct FeedClient {
    inner: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl FeedClient {
    /// Build a client with default User-Agent and timeout.
    pub fn new() -> Result<Self, ScraperError> {
        Self::builder().build()
    }

    pub fn builder() -> FeedClientBuilder {
        FeedClientBuilder::default()
    }

    /// GET `url` once and return the body as text.
    ///
    /// Fails on transport errors, timeouts, and any non-2xx status.
    pub fn fetch(&self, url: &str) -> Result<String, ScraperError> {
        let response = self.inner.get(url).send().map_err(|e| {
            if e.is_timeout() {
                ScraperError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout_secs,
                    source: e,
                }
            } else {
                ScraperError::Network {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().map_err(|e| {
            if e.is_timeout() {
                ScraperError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout_secs,
                    source: e,
                }
            } else {
                ScraperError::BodyRead {
                    url: url.to_string(),
                    source: e,
                }
            }
        })
    }
}

/// Builder for FeedClient with optional User-Agent and timeout.
#[derive(Debug)]
pub struct FeedClientBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl Default for FeedClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl FeedClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Default 10.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    pub fn build(self) -> Result<FeedClient, ScraperError> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ScraperError::ClientBuild { source: e })?;
        Ok(FeedClient {
            inner,
            timeout_secs: self.timeout_secs,
        })
    }
}
