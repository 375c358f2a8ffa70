//! Ambient-mixer site spider.
//!
//! Three stages, each a pure parser over one response:
//!
//! 1. listing pages (`most-rated-audio?page=N`) yield detail links and more
//!    listing pages,
//! 2. a detail page yields the mix metadata and the manifest request,
//! 3. the manifest (XML, on another subdomain) yields the tracks.
//!
//! The metadata from stage 2 travels to stage 3 inside the request's
//! callback as a [`MixContext`], so a record only exists once both halves
//! are merged.

mod detail;
mod error;
mod listing;
mod manifest;

pub use detail::{audio_id_from_href, parse_detail};
pub use error::ParseError;
pub use listing::{page_number, parse_listing, ListingPage};
pub use manifest::{manifest_url, parse_manifest, read_channels};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::crawler::{CrawlRequest, Spider, SpiderOutput, StageOutcome};
use crate::models::MixRecord;
use crate::scrapers::FetchedPage;

pub const DEFAULT_BASE_URL: &str = "https://www.ambient-mixer.com/";
pub const DEFAULT_MANIFEST_URL: &str = "https://xml.ambient-mixer.com/audio-template";
pub const DEFAULT_START_PATH: &str = "most-rated-audio?page=1";

/// Detail-page metadata carried on a manifest request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixContext {
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub audio_id: u64,
}

/// Which stage handles a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Callback {
    Listing,
    Detail,
    Manifest(MixContext),
}

/// Resolve an `href` against the page URL.
///
/// Script, mail and phone links and fragment-only anchors are not links.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

type Outputs = Vec<SpiderOutput<Callback, MixRecord>>;

pub struct AmbientMixerSpider {
    base_url: Url,
    manifest_url: String,
    start_path: String,
}

impl AmbientMixerSpider {
    pub fn new(base_url: &str, manifest_url: &str, start_path: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            manifest_url: manifest_url.trim_end_matches('?').to_string(),
            start_path: start_path.to_string(),
        })
    }

    fn listing(&self, request: &CrawlRequest<Callback>, page: &FetchedPage) -> StageOutcome<Outputs, ParseError> {
        parse_listing(&request.url, page.status, &page.body).map(|listing| {
            let details = listing
                .item_links
                .into_iter()
                .map(|url| request.follow(url, Callback::Detail));
            let pages = listing
                .pagination_links
                .into_iter()
                .map(|url| request.follow(url, Callback::Listing));
            details.chain(pages).map(SpiderOutput::Request).collect()
        })
    }

    fn detail(&self, request: &CrawlRequest<Callback>, page: &FetchedPage) -> StageOutcome<Outputs, ParseError> {
        if !page.is_success() {
            return StageOutcome::Skip;
        }
        StageOutcome::from(parse_detail(&page.body)).map(|context| {
            let url = manifest_url(&self.manifest_url, context.audio_id);
            vec![SpiderOutput::Request(
                request.follow(url, Callback::Manifest(context)),
            )]
        })
    }

    fn manifest(&self, context: MixContext, page: &FetchedPage) -> StageOutcome<Outputs, ParseError> {
        if !page.is_success() {
            return StageOutcome::Skip;
        }
        StageOutcome::from(parse_manifest(&page.body, context))
            .map(|record| vec![SpiderOutput::Item(record)])
    }
}

impl Spider for AmbientMixerSpider {
    type Callback = Callback;
    type Item = MixRecord;
    type Error = ParseError;

    fn name(&self) -> &str {
        "ambient_mixer"
    }

    fn start_requests(&self) -> Vec<CrawlRequest<Callback>> {
        match self.base_url.join(&self.start_path) {
            Ok(url) => vec![CrawlRequest::new(url.to_string(), Callback::Listing)],
            Err(e) => {
                tracing::error!("Invalid start path {:?}: {}", self.start_path, e);
                Vec::new()
            }
        }
    }

    fn handle(&self, request: CrawlRequest<Callback>, page: &FetchedPage) -> StageOutcome<Outputs, ParseError> {
        match request.callback.clone() {
            Callback::Listing => self.listing(&request, page),
            Callback::Detail => self.detail(&request, page),
            Callback::Manifest(context) => self.manifest(context, page),
        }
    }
}
