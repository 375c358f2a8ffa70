//! Fetching and site-specific parsing.

pub mod ambient_mixer;
mod http_client;
pub mod rate_limiter;

pub use http_client::{
    resolve_user_agent, FetchError, FetchedPage, Fetcher, HttpClient, HttpResponse,
    USER_AGENT,
};
pub use rate_limiter::{DomainPermit, RateLimitConfig, RateLimiter};
