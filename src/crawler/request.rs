//! Crawl requests.

use serde::{Deserialize, Serialize};

/// A URL to fetch plus the stage that should handle its response.
///
/// `callback` carries whatever state the handling stage needs, so a request
/// can be persisted and replayed without any side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest<C> {
    pub url: String,
    pub callback: C,
    /// Hops from a start request.
    #[serde(default)]
    pub depth: u32,
}

impl<C> CrawlRequest<C> {
    /// A start request.
    pub fn new(url: impl Into<String>, callback: C) -> Self {
        Self {
            url: url.into(),
            callback,
            depth: 0,
        }
    }

    /// A request discovered while handling this one.
    pub fn follow<D>(&self, url: impl Into<String>, callback: D) -> CrawlRequest<D> {
        CrawlRequest {
            url: url.into(),
            callback,
            depth: self.depth + 1,
        }
    }
}
