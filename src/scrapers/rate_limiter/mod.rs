//! Adaptive per-domain rate limiter.
//!
//! Spaces requests to each domain by a delay that follows observed latency,
//! caps concurrent requests per domain, and backs off on 429/503.

mod config;
mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, RwLock};
use tracing::{debug, warn};
use url::Url;

pub use config::{DomainStats, RateLimitConfig};
use domain_state::DomainState;

/// Held while a request to a domain is in flight.
#[derive(Debug)]
pub struct DomainPermit {
    domain: String,
    _slot: OwnedSemaphorePermit,
}

impl DomainPermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

/// Adaptive rate limiter that tracks per-domain request timing.
#[derive(Debug)]
pub struct RateLimiter {
    pub(crate) config: RateLimitConfig,
    pub(crate) domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait for a free slot and the domain's delay, then mark the request as started.
    pub async fn acquire(&self, url: &str) -> Option<DomainPermit> {
        let domain = Self::extract_domain(url)?;

        let slots = {
            let mut domains = self.domains.write().await;
            domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(&self.config))
                .slots
                .clone()
        };
        // The semaphore is never closed, so acquisition only fails if it were.
        let slot = slots.acquire_owned().await.ok()?;

        let ready_at = {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(&self.config));
            state.reserve(Instant::now())
        };

        let wait = ready_at.saturating_duration_since(Instant::now());
        if wait > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        Some(DomainPermit {
            domain,
            _slot: slot,
        })
    }

    /// Report a response so the domain's delay can adapt.
    pub async fn report_response(&self, domain: &str, status_code: u16, latency: Duration) {
        if Self::is_rate_limit(status_code) {
            self.report_rate_limit(domain, status_code).await;
            return;
        }
        if !self.config.autothrottle {
            return;
        }

        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let success = (200..300).contains(&status_code);
            state.adjust_for_latency(latency, success, &self.config);
            if success {
                state.in_backoff = false;
            }
            debug!(
                "Domain {} delay now {:?} (latency {:?}, HTTP {})",
                domain, state.current_delay, latency, status_code
            );
        }
    }

    /// Check if a status code is a rate limit signal.
    pub fn is_rate_limit(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Report a rate limit hit (429 or 503) - increases delay.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.in_backoff = true;

            let base = state.current_delay.max(Duration::from_millis(100));
            let new_delay =
                Duration::from_secs_f64(base.as_secs_f64() * self.config.backoff_multiplier);
            state.current_delay = new_delay.min(self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Get statistics for all domains.
    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            domains: self.domains.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            start_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://www.ambient-mixer.com/most-rated-audio?page=1"),
            Some("www.ambient-mixer.com".to_string())
        );
        assert_eq!(
            RateLimiter::extract_domain("https://xml.ambient-mixer.com/audio-template"),
            Some("xml.ambient-mixer.com".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("nope"), None);
    }

    #[tokio::test]
    async fn test_backoff_on_rate_limit() {
        let limiter = RateLimiter::with_config(fast_config());

        let permit = limiter.acquire("https://example.com/1").await.unwrap();
        assert_eq!(permit.domain(), "example.com");

        limiter
            .report_response("example.com", 429, Duration::from_millis(5))
            .await;

        let stats = limiter.get_stats().await;
        let domain_stats = stats.get("example.com").unwrap();
        assert!(domain_stats.current_delay >= Duration::from_millis(200));
        assert!(domain_stats.in_backoff);
        assert_eq!(domain_stats.rate_limit_hits, 1);
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let limiter = RateLimiter::with_config(fast_config());
        limiter.acquire("https://a.example/1").await.unwrap();
        limiter.acquire("https://b.example/1").await.unwrap();

        limiter
            .report_response("a.example", 503, Duration::from_millis(5))
            .await;

        let stats = limiter.get_stats().await;
        assert!(stats["a.example"].in_backoff);
        assert!(!stats["b.example"].in_backoff);
        assert_eq!(stats["b.example"].current_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrency_cap_per_domain() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            start_delay: Duration::ZERO,
            max_concurrency: 1,
            ..Default::default()
        });

        let first = limiter.acquire("https://example.com/1").await.unwrap();
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire("https://example.com/2"),
        )
        .await;
        assert!(second.is_err(), "second request should wait for the slot");

        drop(first);
        let third = tokio::time::timeout(
            Duration::from_millis(500),
            limiter.acquire("https://example.com/3"),
        )
        .await;
        assert!(third.is_ok());
    }
}
