//! Rate limiter configuration.

use std::time::Duration;

/// Adaptive throttle settings, applied per domain.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether delays follow observed latency. When off, the delay stays at
    /// `start_delay` except for 429/503 backoff.
    pub autothrottle: bool,
    /// Initial delay between requests to one domain.
    pub start_delay: Duration,
    /// Lower bound for the adapted delay.
    pub min_delay: Duration,
    /// Upper bound for any delay, including backoff.
    pub max_delay: Duration,
    /// Average number of requests to keep in flight per domain.
    pub target_concurrency: f64,
    /// Hard cap on simultaneous requests per domain.
    pub max_concurrency: usize,
    /// Multiplier applied on 429/503.
    pub backoff_multiplier: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            autothrottle: true,
            start_delay: Duration::from_millis(200),
            min_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
            target_concurrency: 24.0,
            max_concurrency: 24,
            backoff_multiplier: 2.0,
        }
    }
}

/// Snapshot of one domain's throttle state.
#[derive(Debug, Clone)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}
