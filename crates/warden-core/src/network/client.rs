//! HTTP client with rate limit awareness.
//!
//! Wraps reqwest with:
//! - A fixed identifying user agent
//! - Separate timeout profiles for API calls and large downloads
//! - Rate limit tracking from registry response headers

use crate::config::NetworkConfig;
use crate::{Result, WardenError};
use reqwest::{header, Client, Response, StatusCode};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Rate limit state extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// Remaining requests allowed.
    pub remaining: Option<u64>,
    /// Unix timestamp when the rate limit resets.
    pub reset: Option<u64>,
}

impl RateLimitState {
    /// Whether the quota is used up.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Seconds from `now_secs` until the quota resets.
    pub fn secs_until_reset(&self, now_secs: u64) -> Option<u64> {
        self.reset.map(|reset| reset.saturating_sub(now_secs))
    }
}

/// HTTP client shared by the release client and the downloader.
pub struct HttpClient {
    client: Client,
    rate_limit_remaining: AtomicI64,
    rate_limit_reset: AtomicU64,
}

impl HttpClient {
    /// Create a client for API requests (bounded total request time).
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::build(
            Client::builder()
                .timeout(NetworkConfig::REQUEST_TIMEOUT)
                .connect_timeout(NetworkConfig::CONNECT_TIMEOUT),
            user_agent,
        )
    }

    /// Create a client for large downloads.
    ///
    /// Only connecting is bounded; a multi-hundred-megabyte archive may take
    /// arbitrarily long on a slow link.
    pub fn for_downloads(user_agent: &str) -> Result<Self> {
        Self::build(
            Client::builder().connect_timeout(NetworkConfig::CONNECT_TIMEOUT),
            user_agent,
        )
    }

    fn build(builder: reqwest::ClientBuilder, user_agent: &str) -> Result<Self> {
        let client = builder
            .user_agent(user_agent)
            .build()
            .map_err(|e| WardenError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            rate_limit_remaining: AtomicI64::new(-1),
            rate_limit_reset: AtomicU64::new(0),
        })
    }

    /// Get the current rate limit state.
    pub fn rate_limit_state(&self) -> RateLimitState {
        let remaining = self.rate_limit_remaining.load(Ordering::SeqCst);
        let reset = self.rate_limit_reset.load(Ordering::SeqCst);
        RateLimitState {
            remaining: u64::try_from(remaining).ok(),
            reset: (reset > 0).then_some(reset),
        }
    }

    /// Make a GET request with extra headers.
    ///
    /// Fails with a network error when the server is unreachable or answers
    /// with a non-success status.
    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.send().await.map_err(|e| WardenError::Network {
            message: format!("GET {} failed: {}", url, e),
            cause: std::error::Error::source(&e).map(|s| s.to_string()),
        })?;

        self.update_rate_limits(&response);
        self.check_response_status(response, url)
    }

    /// Make a plain GET request.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.get_with_headers(url, &[]).await
    }

    fn update_rate_limits(&self, response: &Response) {
        let headers = response.headers();
        let parse = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };

        if let Some(remaining) = parse("X-RateLimit-Remaining") {
            self.rate_limit_remaining
                .store(i64::try_from(remaining).unwrap_or(i64::MAX), Ordering::SeqCst);
        }
        if let Some(reset) = parse("X-RateLimit-Reset") {
            self.rate_limit_reset.store(reset, Ordering::SeqCst);
        }

        if let Some(remaining) = self.rate_limit_state().remaining {
            debug!("Rate limit remaining: {}", remaining);
        }
    }

    fn check_response_status(&self, response: Response, url: &str) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let state = self.rate_limit_state();
        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && state.is_exhausted())
        {
            // Retry-After wins; otherwise wait for the quota reset
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .or_else(|| state.secs_until_reset(unix_now_secs()));
            warn!("Rate limited by {} (retry after {:?}s)", extract_domain(url), retry_after);

            return Err(WardenError::RateLimited {
                service: extract_domain(url),
                retry_after_secs: retry_after,
            });
        }

        Err(WardenError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
