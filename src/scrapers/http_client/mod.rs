//! HTTP client with adaptive per-domain throttling.

mod response;
mod user_agent;

pub use response::{FetchedPage, HttpResponse};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::rate_limiter::RateLimiter;

/// Errors from fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt might succeed (timeouts, dropped connections).
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::InvalidUrl(_) => false,
        }
    }
}

/// Something that can turn a URL into a fully read page.
///
/// The crawl engine only talks to this trait, so tests can crawl an
/// in-memory site.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// HTTP client with optional adaptive rate limiting.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create an unthrottled client.
    pub fn new(timeout: Duration, user_agent_config: Option<&str>) -> Result<Self, FetchError> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            rate_limiter: None,
        })
    }

    /// Create a client that waits on a shared rate limiter before each request.
    pub fn with_rate_limiter(
        timeout: Duration,
        user_agent_config: Option<&str>,
        rate_limiter: RateLimiter,
    ) -> Result<Self, FetchError> {
        let mut client = Self::new(timeout, user_agent_config)?;
        client.rate_limiter = Some(rate_limiter);
        Ok(client)
    }

    /// Make a GET request.
    /// Uses adaptive rate limiting per domain when a limiter is attached.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let permit = match &self.rate_limiter {
            Some(limiter) => limiter.acquire(url).await,
            None => None,
        };

        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let latency = start.elapsed();

        let status = response.status();
        debug!("GET {} -> {} in {:?}", url, status.as_u16(), latency);

        // Report status to rate limiter for adaptive delay
        if let (Some(limiter), Some(permit)) = (&self.rate_limiter, &permit) {
            limiter
                .report_response(permit.domain(), status.as_u16(), latency)
                .await;
        }

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        Ok(HttpResponse {
            status,
            headers,
            response,
            permit,
        })
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if url::Url::parse(url).is_err() {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let response = self.get(url).await?;
        let final_url = response.url().to_string();
        let status = response.status;
        let body = response.text().await?;
        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }
}
