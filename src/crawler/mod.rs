//! Generic crawl engine.
//!
//! A [`Spider`] declares start requests and turns each fetched page into
//! follow-up requests and items. The [`Crawler`] owns everything stateful:
//! the breadth-first frontier, retries, bounded concurrency and the optional
//! on-disk job state. Spiders never fetch and never retry.

mod engine;
mod frontier;
mod request;
pub mod state;

pub use engine::{fetch_with_retry, is_retryable_status, CrawlEvent, CrawlStats, Crawler, CrawlerConfig};
pub use frontier::{fingerprint, Frontier};
pub use request::CrawlRequest;
pub use state::{CrawlState, StateError};

use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::scrapers::FetchedPage;

/// Result of one parsing stage.
///
/// `Skip` is a normal, silent outcome (e.g. an error page). `Malformed`
/// drops the unit of work being built and is logged by the engine.
#[derive(Debug)]
pub enum StageOutcome<T, E> {
    Emit(T),
    Skip,
    Malformed(E),
}

impl<T, E> StageOutcome<T, E> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U, E> {
        match self {
            StageOutcome::Emit(value) => StageOutcome::Emit(f(value)),
            StageOutcome::Skip => StageOutcome::Skip,
            StageOutcome::Malformed(e) => StageOutcome::Malformed(e),
        }
    }
}

impl<T, E> From<Result<T, E>> for StageOutcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StageOutcome::Emit(value),
            Err(e) => StageOutcome::Malformed(e),
        }
    }
}

/// Something a spider produces from a page.
#[derive(Debug)]
pub enum SpiderOutput<C, T> {
    Request(CrawlRequest<C>),
    Item(T),
}

/// Site-specific crawl logic.
pub trait Spider: Send + Sync {
    /// Identifies the stage a request belongs to, plus any state it carries.
    type Callback: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;
    type Item: Serialize + Send;
    type Error: Display;

    fn name(&self) -> &str;

    fn start_requests(&self) -> Vec<CrawlRequest<Self::Callback>>;

    /// Handle the response to `request`.
    fn handle(
        &self,
        request: CrawlRequest<Self::Callback>,
        page: &FetchedPage,
    ) -> StageOutcome<Vec<SpiderOutput<Self::Callback, Self::Item>>, Self::Error>;
}
