//! Crawl loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::frontier::{fingerprint, Frontier};
use super::state::{CrawlState, StateError};
use super::{CrawlRequest, Spider, SpiderOutput, StageOutcome};
use crate::scrapers::{FetchError, FetchedPage, Fetcher};
use crate::sink::RecordSink;

/// Engine limits.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Fetches in flight at once, across all domains.
    pub concurrent_requests: usize,
    /// Extra attempts for transient failures.
    pub retry_times: u32,
    /// Stop dispatching after this many fetches (0 = unlimited).
    pub max_pages: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: 24,
            retry_times: 2,
            max_pages: 0,
        }
    }
}

/// Progress events emitted while crawling.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Fetched { url: String, status: u16 },
    Item { url: String },
    Malformed { url: String, error: String },
    Failed { url: String, error: String },
}

/// Counters for a crawl run.
#[derive(Debug, Clone)]
pub struct CrawlStats {
    pub started_at: DateTime<Utc>,
    pub resumed: bool,
    pub pages_fetched: u64,
    pub items_emitted: u64,
    pub requests_scheduled: u64,
    pub skipped: u64,
    /// 404 responses; skipped like any other error page but counted apart.
    pub not_found: u64,
    pub malformed: u64,
    pub failed: u64,
    /// Requests left in the frontier when the run stopped.
    pub pending: u64,
}

impl CrawlStats {
    fn new(started_at: DateTime<Utc>, resumed: bool) -> Self {
        Self {
            started_at,
            resumed,
            pages_fetched: 0,
            items_emitted: 0,
            requests_scheduled: 0,
            skipped: 0,
            not_found: 0,
            malformed: 0,
            failed: 0,
            pending: 0,
        }
    }
}

/// Statuses worth another attempt. 404 is final.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

/// Fetch a URL, retrying transient transport errors and retryable statuses.
///
/// After the last attempt the final response (or error) is returned as-is.
pub async fn fetch_with_retry<F>(
    fetcher: &F,
    url: &str,
    retry_times: u32,
) -> Result<FetchedPage, FetchError>
where
    F: Fetcher + ?Sized,
{
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url).await {
            Ok(page) if is_retryable_status(page.status) && attempt < retry_times => {
                attempt += 1;
                debug!(
                    "Retrying {} after HTTP {} ({}/{})",
                    url,
                    page.status.as_u16(),
                    attempt,
                    retry_times
                );
            }
            Err(e) if e.is_transient() && attempt < retry_times => {
                attempt += 1;
                debug!("Retrying {} after {} ({}/{})", url, e, attempt, retry_times);
            }
            other => return other,
        }
    }
}

type Fetched<C> = (CrawlRequest<C>, Result<FetchedPage, FetchError>);

/// Breadth-first crawler driving one spider.
pub struct Crawler<S: Spider, F: Fetcher + 'static> {
    spider: S,
    fetcher: Arc<F>,
    config: CrawlerConfig,
    frontier: Frontier<S::Callback>,
    state: Option<CrawlState>,
    started_at: DateTime<Utc>,
    resumed: bool,
    events: Option<mpsc::Sender<CrawlEvent>>,
}

impl<S: Spider, F: Fetcher + 'static> Crawler<S, F> {
    /// Create a crawler seeded with the spider's start requests.
    pub fn new(spider: S, fetcher: Arc<F>, config: CrawlerConfig) -> Self {
        let mut frontier = Frontier::new();
        for request in spider.start_requests() {
            frontier.push(request);
        }
        Self {
            spider,
            fetcher,
            config,
            frontier,
            state: None,
            started_at: Utc::now(),
            resumed: false,
            events: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Persist the frontier in `state`.
    ///
    /// An interrupted job (requests still pending) resumes where it stopped
    /// unless `fresh` is set; otherwise the state is reset and reseeded.
    /// Returns whether the job resumed.
    pub fn attach_state(&mut self, mut state: CrawlState, fresh: bool) -> Result<bool, StateError> {
        let saved = state.load::<S::Callback>()?;

        if !fresh && saved.is_resumable() {
            info!(
                "Resuming {} crawl: {} pending, {} seen",
                self.spider.name(),
                saved.pending.len(),
                saved.seen.len()
            );
            self.started_at = saved.started_at.unwrap_or_else(Utc::now);
            self.frontier = Frontier::restore(saved.seen, saved.pending);
            self.resumed = true;
        } else {
            state.reset(self.started_at)?;
            for request in self.frontier.iter() {
                state.schedule(&fingerprint(&request.url), request)?;
            }
            self.resumed = false;
        }

        self.state = Some(state);
        Ok(self.resumed)
    }

    pub fn spider(&self) -> &S {
        &self.spider
    }

    /// Crawl until the frontier is empty (or the page limit is hit), writing
    /// every item to `sink`.
    ///
    /// Fetch failures and malformed pages are counted and logged; only sink
    /// and state errors abort the run.
    pub async fn run<K>(&mut self, sink: &mut K) -> anyhow::Result<CrawlStats>
    where
        K: RecordSink<S::Item> + ?Sized,
    {
        let mut stats = CrawlStats::new(self.started_at, self.resumed);
        let mut in_flight: JoinSet<Fetched<S::Callback>> = JoinSet::new();
        let mut dispatched: u64 = 0;
        let concurrency = self.config.concurrent_requests.max(1);

        info!("Starting {} crawl", self.spider.name());

        loop {
            while in_flight.len() < concurrency && !self.limit_reached(dispatched) {
                let Some(request) = self.frontier.pop() else {
                    break;
                };
                dispatched += 1;
                let fetcher = self.fetcher.clone();
                let retry_times = self.config.retry_times;
                in_flight.spawn(async move {
                    let result = fetch_with_retry(fetcher.as_ref(), &request.url, retry_times).await;
                    (request, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok((request, result)) => self.process(request, result, sink, &mut stats).await?,
                Err(e) => {
                    warn!("Fetch task failed: {}", e);
                    stats.failed += 1;
                }
            }
        }

        stats.pending = self.frontier.len() as u64;
        info!(
            "Finished {} crawl: {} pages, {} items, {} malformed, {} failed, {} pending",
            self.spider.name(),
            stats.pages_fetched,
            stats.items_emitted,
            stats.malformed,
            stats.failed,
            stats.pending
        );
        Ok(stats)
    }

    fn limit_reached(&self, dispatched: u64) -> bool {
        self.config.max_pages > 0 && dispatched >= self.config.max_pages
    }

    async fn process<K>(
        &mut self,
        request: CrawlRequest<S::Callback>,
        result: Result<FetchedPage, FetchError>,
        sink: &mut K,
        stats: &mut CrawlStats,
    ) -> anyhow::Result<()>
    where
        K: RecordSink<S::Item> + ?Sized,
    {
        let url = request.url.clone();

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!("Giving up on {}: {}", url, e);
                stats.failed += 1;
                self.emit(CrawlEvent::Failed {
                    url: url.clone(),
                    error: e.to_string(),
                })
                .await;
                self.complete(&url)?;
                return Ok(());
            }
        };

        stats.pages_fetched += 1;
        self.emit(CrawlEvent::Fetched {
            url: url.clone(),
            status: page.status.as_u16(),
        })
        .await;

        let not_found = page.is_not_found();
        match self.spider.handle(request, &page) {
            StageOutcome::Emit(outputs) => {
                for output in outputs {
                    match output {
                        SpiderOutput::Request(next) => self.schedule(next, stats)?,
                        SpiderOutput::Item(item) => {
                            sink.write(&item)?;
                            stats.items_emitted += 1;
                            self.emit(CrawlEvent::Item { url: url.clone() }).await;
                        }
                    }
                }
            }
            StageOutcome::Skip if not_found => {
                debug!("Not found: {}", url);
                stats.not_found += 1;
            }
            StageOutcome::Skip => {
                debug!("Skipped {} (HTTP {})", url, page.status.as_u16());
                stats.skipped += 1;
            }
            StageOutcome::Malformed(e) => {
                warn!("Dropping {}: {}", url, e);
                stats.malformed += 1;
                self.emit(CrawlEvent::Malformed {
                    url: url.clone(),
                    error: e.to_string(),
                })
                .await;
            }
        }

        self.complete(&url)?;
        Ok(())
    }

    fn schedule(
        &mut self,
        request: CrawlRequest<S::Callback>,
        stats: &mut CrawlStats,
    ) -> Result<(), StateError> {
        let persisted = self.state.is_some().then(|| request.clone());
        if let Some(fp) = self.frontier.push(request) {
            stats.requests_scheduled += 1;
            if let (Some(state), Some(request)) = (&self.state, persisted) {
                state.schedule(&fp, &request)?;
            }
        }
        Ok(())
    }

    fn complete(&self, url: &str) -> Result<(), StateError> {
        if let Some(state) = &self.state {
            state.complete(&fingerprint(url))?;
        }
        Ok(())
    }

    async fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    use super::*;
    use crate::sink::JsonArraySink;

    /// Serves canned responses and counts hits per URL.
    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, Vec<(u16, String)>>,
        hits: Mutex<HashMap<String, usize>>,
        calls: AtomicUsize,
    }

    impl FakeSite {
        fn page(mut self, url: &str, status: u16, body: &str) -> Self {
            self.pages
                .entry(url.to_string())
                .or_default()
                .push((status, body.to_string()));
            self
        }

        fn hits(&self, url: &str) -> usize {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for FakeSite {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = {
                let mut hits = self.hits.lock().unwrap();
                let n = hits.entry(url.to_string()).or_default();
                *n += 1;
                *n
            };
            let responses = self
                .pages
                .get(url)
                .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
            let (status, body) = &responses[(n - 1).min(responses.len() - 1)];
            Ok(FetchedPage::new(
                url,
                StatusCode::from_u16(*status).unwrap(),
                body.clone(),
            ))
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum Step {
        Links,
        Leaf,
    }

    /// Bodies are whitespace-separated links; a leaf emits its body as an item.
    struct LinkSpider;

    impl Spider for LinkSpider {
        type Callback = Step;
        type Item = String;
        type Error = String;

        fn name(&self) -> &str {
            "links"
        }

        fn start_requests(&self) -> Vec<CrawlRequest<Step>> {
            vec![CrawlRequest::new("https://site.test/start", Step::Links)]
        }

        fn handle(
            &self,
            request: CrawlRequest<Step>,
            page: &FetchedPage,
        ) -> StageOutcome<Vec<SpiderOutput<Step, String>>, String> {
            if !page.is_success() {
                return StageOutcome::Skip;
            }
            match request.callback {
                Step::Links => StageOutcome::Emit(
                    page.body
                        .split_whitespace()
                        .map(|link| SpiderOutput::Request(request.follow(link, Step::Leaf)))
                        .collect(),
                ),
                Step::Leaf if page.body == "bad" => StageOutcome::Malformed("bad leaf".to_string()),
                Step::Leaf => StageOutcome::Emit(vec![SpiderOutput::Item(page.body.clone())]),
            }
        }
    }

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            concurrent_requests: 4,
            retry_times: 2,
            max_pages: 0,
        }
    }

    async fn crawl(site: Arc<FakeSite>, config: CrawlerConfig) -> (CrawlStats, Vec<String>) {
        let mut crawler = Crawler::new(LinkSpider, site, config);
        let mut sink = JsonArraySink::new(Vec::new()).unwrap();
        let stats = crawler.run(&mut sink).await.unwrap();
        let out = sink.finish().unwrap();
        let mut items: Vec<String> = serde_json::from_slice(&out).unwrap();
        items.sort();
        (stats, items)
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 301, 403, 404] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[tokio::test]
    async fn test_duplicate_links_fetched_once() {
        let site = Arc::new(
            FakeSite::default()
                .page(
                    "https://site.test/start",
                    200,
                    "https://site.test/a https://site.test/a#frag https://site.test/b",
                )
                .page("https://site.test/a", 200, "A")
                .page("https://site.test/b", 200, "B"),
        );
        let (stats, items) = crawl(site.clone(), config()).await;
        assert_eq!(items, vec!["A", "B"]);
        assert_eq!(site.hits("https://site.test/a"), 1);
        assert_eq!(stats.pages_fetched, 3);
        assert_eq!(stats.items_emitted, 2);
        assert_eq!(stats.requests_scheduled, 2);
    }

    #[tokio::test]
    async fn test_not_found_counted_apart_and_not_retried() {
        let site = Arc::new(
            FakeSite::default()
                .page(
                    "https://site.test/start",
                    200,
                    "https://site.test/gone https://site.test/forbidden https://site.test/ok",
                )
                .page("https://site.test/gone", 404, "")
                .page("https://site.test/forbidden", 403, "")
                .page("https://site.test/ok", 200, "ok"),
        );
        let (stats, items) = crawl(site.clone(), config()).await;
        assert_eq!(items, vec!["ok"]);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(site.hits("https://site.test/gone"), 1);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let site = Arc::new(
            FakeSite::default()
                .page("https://site.test/start", 200, "https://site.test/flaky")
                .page("https://site.test/flaky", 503, "")
                .page("https://site.test/flaky", 200, "recovered"),
        );
        let (_, items) = crawl(site.clone(), config()).await;
        assert_eq!(items, vec!["recovered"]);
        assert_eq!(site.hits("https://site.test/flaky"), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let site = Arc::new(
            FakeSite::default()
                .page("https://site.test/start", 200, "https://site.test/down")
                .page("https://site.test/down", 500, ""),
        );
        let (stats, items) = crawl(site.clone(), config()).await;
        assert!(items.is_empty());
        assert_eq!(site.hits("https://site.test/down"), 3);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_malformed_page_does_not_stop_crawl() {
        let site = Arc::new(
            FakeSite::default()
                .page(
                    "https://site.test/start",
                    200,
                    "https://site.test/bad https://site.test/good https://site.test/missing",
                )
                .page("https://site.test/bad", 200, "bad")
                .page("https://site.test/good", 200, "good"),
        );
        let (stats, items) = crawl(site, config()).await;
        assert_eq!(items, vec!["good"]);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_max_pages_leaves_rest_pending() {
        let site = Arc::new(
            FakeSite::default()
                .page(
                    "https://site.test/start",
                    200,
                    "https://site.test/a https://site.test/b",
                )
                .page("https://site.test/a", 200, "A")
                .page("https://site.test/b", 200, "B"),
        );
        let (stats, _) = crawl(
            site.clone(),
            CrawlerConfig {
                concurrent_requests: 1,
                max_pages: 2,
                ..config()
            },
        )
        .await;
        assert_eq!(stats.pages_fetched, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(site.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_interrupted_job_resumes() {
        let dir = tempdir().unwrap();
        let site = Arc::new(
            FakeSite::default()
                .page(
                    "https://site.test/start",
                    200,
                    "https://site.test/a https://site.test/b",
                )
                .page("https://site.test/a", 200, "A")
                .page("https://site.test/b", 200, "B"),
        );

        let mut first = Crawler::new(
            LinkSpider,
            site.clone(),
            CrawlerConfig {
                concurrent_requests: 1,
                max_pages: 2,
                ..config()
            },
        );
        assert!(!first
            .attach_state(CrawlState::open(dir.path()).unwrap(), false)
            .unwrap());
        let mut sink = JsonArraySink::new(Vec::new()).unwrap();
        first.run(&mut sink).await.unwrap();

        let mut second = Crawler::new(LinkSpider, site.clone(), config());
        assert!(second
            .attach_state(CrawlState::open(dir.path()).unwrap(), false)
            .unwrap());
        let mut sink = JsonArraySink::new(Vec::new()).unwrap();
        let stats = second.run(&mut sink).await.unwrap();
        let items: Vec<String> = serde_json::from_slice(&sink.finish().unwrap()).unwrap();

        assert!(stats.resumed);
        assert_eq!(items, vec!["B"]);
        assert_eq!(site.hits("https://site.test/start"), 1);
        assert_eq!(site.hits("https://site.test/a"), 1);

        // finished job starts over
        let mut third = Crawler::new(LinkSpider, site.clone(), config());
        assert!(!third
            .attach_state(CrawlState::open(dir.path()).unwrap(), false)
            .unwrap());
    }
}
