//! Listing page parser: pagination and item links.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use url::Url;

use super::error::ParseError;
use super::resolve_link;
use crate::crawler::StageOutcome;

static PAGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]page=(\d+)").expect("static regex"));
static PAGINATION_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[class='pages'] a").expect("static selector"));
static ITEM_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div[class^='select_dash_ambient'] a").expect("static selector")
});

/// Links extracted from one page of the mix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub page: u32,
    pub item_links: Vec<String>,
    pub pagination_links: Vec<String>,
}

/// Page number from the `page=<n>` query parameter.
pub fn page_number(url: &str) -> Option<u32> {
    PAGE_PARAM
        .captures(url)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|page| *page > 0)
}

/// Parse a listing page.
///
/// Any non-success status (404 included) and any URL without a page number
/// yield [`StageOutcome::Skip`]: no links of any kind.
pub fn parse_listing(url: &str, status: StatusCode, html: &str) -> StageOutcome<ListingPage, ParseError> {
    if !status.is_success() {
        return StageOutcome::Skip;
    }
    let Some(page) = page_number(url) else {
        return StageOutcome::Skip;
    };
    let Ok(base) = Url::parse(url) else {
        return StageOutcome::Skip;
    };

    let document = Html::parse_document(html);
    StageOutcome::Emit(ListingPage {
        page,
        item_links: collect_links(&document, &ITEM_LINKS, &base),
        pagination_links: collect_links(&document, &PAGINATION_LINKS, &base),
    })
}

/// Resolved `href`s in document order, first occurrence wins.
fn collect_links(document: &Html, selector: &Selector, base: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    document
        .select(selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(base, href))
        .filter(|link| seen.insert(link.clone()))
        .collect()
}
