//! Crawl command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use tokio::sync::mpsc;

use crate::cli::icons::{dim_arrow, error, info, success, warn};
use crate::cli::progress;
use crate::config::Settings;
use crate::crawler::{CrawlEvent, CrawlState, Crawler};
use crate::scrapers::ambient_mixer::AmbientMixerSpider;
use crate::scrapers::{HttpClient, RateLimiter};
use crate::sink::JsonArraySink;

/// Command-line overrides for a crawl.
#[derive(Debug, Default)]
pub struct ScrapeOverrides {
    pub output: Option<PathBuf>,
    pub job_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub limit: Option<u64>,
    pub fresh: bool,
}

impl ScrapeOverrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(ref output) = self.output {
            settings.output = output.clone();
        }
        if let Some(ref job_dir) = self.job_dir {
            settings.job_dir = job_dir.clone();
        }
        if let Some(n) = self.concurrency {
            settings.concurrent_requests = n;
        }
        if let Some(limit) = self.limit {
            settings.max_pages = limit;
        }
    }
}

/// Crawl listings, detail pages and manifests into the output array.
pub async fn cmd_scrape(settings: &Settings, overrides: ScrapeOverrides) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    overrides.apply(&mut settings);

    let spider = AmbientMixerSpider::new(
        &settings.base_url,
        &settings.manifest_url,
        &settings.start_path,
    )
    .context("Invalid site URL in settings")?;

    let limiter = RateLimiter::with_config(settings.rate_limit_config());
    let client = HttpClient::with_rate_limiter(
        settings.request_timeout(),
        settings.user_agent.as_deref(),
        limiter.clone(),
    )
    .context("Failed to create HTTP client")?;

    let (event_tx, mut event_rx) = mpsc::channel::<CrawlEvent>(100);
    let mut crawler = Crawler::new(spider, Arc::new(client), settings.crawler_config())
        .with_events(event_tx);

    let state = CrawlState::open(&settings.job_dir)
        .with_context(|| format!("Failed to open job state in {}", settings.job_dir.display()))?;
    let resumed = crawler
        .attach_state(state, overrides.fresh)
        .context("Failed to load job state")?;

    let mut sink = if resumed {
        println!(
            "{} Resuming crawl from {}",
            info(),
            settings.job_dir.display()
        );
        JsonArraySink::open_resumed(&settings.output)?
    } else {
        println!("{} Crawling {}", info(), settings.base_url);
        JsonArraySink::create(&settings.output)?
    };
    let carried = sink.count();

    let spinner = progress::spinner("Crawling");
    let handler_spinner = spinner.clone();
    let event_handler = tokio::spawn(async move {
        let mut pages = 0u64;
        let mut mixes = 0u64;
        while let Some(event) = event_rx.recv().await {
            match event {
                CrawlEvent::Fetched { .. } => pages += 1,
                CrawlEvent::Item { .. } => mixes += 1,
                CrawlEvent::Malformed { url, error: e } => {
                    handler_spinner.suspend(|| {
                        eprintln!("{} Skipped malformed page {}: {}", warn(), url, e)
                    });
                }
                CrawlEvent::Failed { url, error: e } => {
                    handler_spinner
                        .suspend(|| eprintln!("{} Failed to fetch {}: {}", error(), url, e));
                }
            }
            handler_spinner.set_message(format!("Crawling: {} pages, {} mixes", pages, mixes));
        }
    });

    let result = crawler.run(&mut sink).await;
    // Dropping the crawler closes the event channel so the handler finishes.
    drop(crawler);
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }
    spinner.finish_and_clear();

    let stats = result?;
    let written = sink.count();
    sink.finish()
        .with_context(|| format!("Failed to finish {}", settings.output.display()))?;

    println!(
        "{} Wrote {} mixes to {}",
        success(),
        written,
        settings.output.display()
    );
    if carried > 0 {
        println!("  {} {} carried over from the previous run", dim_arrow(), carried);
    }
    println!(
        "  {} {} pages fetched, {} requests scheduled",
        dim_arrow(),
        stats.pages_fetched,
        stats.requests_scheduled
    );
    if stats.not_found > 0 || stats.skipped > 0 {
        println!(
            "  {} {} not found, {} other error pages skipped",
            dim_arrow(),
            stats.not_found,
            stats.skipped
        );
    }
    if stats.malformed > 0 {
        println!("  {} {} malformed pages", warn(), stats.malformed);
    }
    if stats.failed > 0 {
        println!("  {} {} fetches failed", warn(), stats.failed);
    }
    if stats.pending > 0 {
        println!(
            "  {} {} requests pending; run again to resume",
            warn(),
            stats.pending
        );
    }

    let mut domains: Vec<_> = limiter.get_stats().await.into_iter().collect();
    domains.sort_by(|a, b| a.0.cmp(&b.0));
    for (domain, domain_stats) in domains {
        println!(
            "  {} {}: {} requests, delay {:?}, {} rate limit hits",
            style("•").dim(),
            domain,
            domain_stats.total_requests,
            domain_stats.current_delay,
            domain_stats.rate_limit_hits
        );
    }

    Ok(())
}
