//! Per-domain rate limiting state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use super::config::RateLimitConfig;

/// State for a single domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Current delay for this domain.
    pub current_delay: Duration,
    /// Time the most recent request was (or is scheduled to be) sent.
    pub last_request: Option<Instant>,
    /// Slots bounding concurrent requests to this domain.
    pub slots: Arc<Semaphore>,
    /// Whether currently in backoff.
    pub in_backoff: bool,
    /// Total requests made.
    pub total_requests: u64,
    /// Total rate limit hits.
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            current_delay: config.start_delay,
            last_request: None,
            slots: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Reserve the next send time, spacing requests by the current delay.
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let ready_at = match self.last_request {
            Some(last) => (last + self.current_delay).max(now),
            None => now,
        };
        self.last_request = Some(ready_at);
        self.total_requests += 1;
        ready_at
    }

    /// Move the delay toward `latency / target_concurrency`.
    ///
    /// The new delay is the mean of the old delay and the target, never below
    /// the target, clamped to the configured bounds. Non-success responses may
    /// raise the delay but never lower it.
    pub fn adjust_for_latency(&mut self, latency: Duration, success: bool, config: &RateLimitConfig) {
        let concurrency = config.target_concurrency.max(1.0);
        let target = latency.as_secs_f64() / concurrency;
        let current = self.current_delay.as_secs_f64();

        let mut next = ((current + target) / 2.0).max(target);
        next = next
            .max(config.min_delay.as_secs_f64())
            .min(config.max_delay.as_secs_f64());

        if !success && next <= current {
            return;
        }
        self.current_delay = Duration::from_secs_f64(next);
    }
}
