//! Breadth-first frontier with URL deduplication.

use std::collections::{HashSet, VecDeque};

use url::Url;

use super::CrawlRequest;

/// Normalize a URL for deduplication.
///
/// Scheme and host are lowercased by the parser, the fragment is dropped and
/// query pairs are sorted, so `?b=2&a=1#x` and `?a=1&b=2` collide. Strings
/// that do not parse as URLs are compared trimmed.
pub fn fingerprint(url: &str) -> String {
    let mut parsed = match Url::parse(url.trim()) {
        Ok(u) => u,
        Err(_) => return url.trim().to_string(),
    };
    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    parsed.to_string()
}

/// FIFO queue of requests plus the set of every fingerprint ever scheduled.
#[derive(Debug)]
pub struct Frontier<C> {
    queue: VecDeque<CrawlRequest<C>>,
    seen: HashSet<String>,
}

impl<C> Default for Frontier<C> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
        }
    }
}

impl<C> Frontier<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a frontier from persisted state.
    ///
    /// Pending requests are queued as-is; they are already part of `seen`.
    pub fn restore(
        seen: impl IntoIterator<Item = String>,
        pending: impl IntoIterator<Item = CrawlRequest<C>>,
    ) -> Self {
        let mut frontier = Self {
            queue: pending.into_iter().collect(),
            seen: seen.into_iter().collect(),
        };
        for request in &frontier.queue {
            frontier.seen.insert(fingerprint(&request.url));
        }
        frontier
    }

    /// Queue a request unless its URL was scheduled before.
    ///
    /// Returns the fingerprint when the request was queued.
    pub fn push(&mut self, request: CrawlRequest<C>) -> Option<String> {
        let fp = fingerprint(&request.url);
        if !self.seen.insert(fp.clone()) {
            return None;
        }
        self.queue.push_back(request);
        Some(fp)
    }

    /// Queued requests, next to be fetched first.
    pub fn iter(&self) -> impl Iterator<Item = &CrawlRequest<C>> {
        self.queue.iter()
    }

    pub fn pop(&mut self) -> Option<CrawlRequest<C>> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs ever scheduled.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
