//! Link-following harvest for sites that serve each page in one request.
//!
//! Fetch a page, extract its items, merge them, follow the "next" link, and
//! repeat until there is no next link, a page comes back empty, a request
//! fails, or the page cap is hit. Items gathered before a failure are kept.

use crate::accumulator::Accumulator;
use crate::extract::ItemExtractor;
use crate::models::NewsItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Desktop Chrome UA; some sites serve a stripped page to unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub type FetchError = Box<dyn Error + Send + Sync>;

/// Retrieves the markup behind a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// `reqwest`-backed fetcher with a browser User-Agent and a request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

/// An extractor that also knows how to find the next page.
pub trait PagedSource: ItemExtractor {
    /// Absolute URL of the page after `current_url`, if the markup links one.
    fn next_page_url(&self, markup: &str, current_url: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    pub max_pages: usize,
    pub request_timeout_ms: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            request_timeout_ms: 15_000,
        }
    }
}

pub struct PaginationPlan {
    pub site: &'static str,
    pub start_url: String,
    pub source: Box<dyn PagedSource>,
    pub config: PaginationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStop {
    NoNextLink,
    EmptyPage,
    FetchFailed,
    PageCap,
}

#[derive(Debug)]
pub struct PaginationReport {
    pub items: Vec<NewsItem>,
    /// Pages fetched successfully.
    pub pages: usize,
    pub stop: PageStop,
}

/// Walk the pages of `plan` starting at its start URL.
///
/// # Arguments
///
/// * `fetcher` - Transport used for every page request
/// * `plan` - Site extractor, start URL and page cap
///
/// # Returns
///
/// Every distinct item in first-seen order, with the page count and the
/// reason the walk ended. Never fails: a transport error ends the walk and
/// is reported as [`PageStop::FetchFailed`].
#[instrument(level = "info", skip_all, fields(site = plan.site))]
pub async fn paginate(fetcher: &dyn PageFetcher, plan: &PaginationPlan) -> PaginationReport {
    let mut acc = Accumulator::new();
    let mut url = plan.start_url.clone();
    let mut pages = 0;
    let mut stop = PageStop::PageCap;

    for page in 1..=plan.config.max_pages {
        info!(page, %url, "Fetching page");
        let markup = match fetcher.fetch(&url).await {
            Ok(markup) => markup,
            Err(e) => {
                warn!(page, %url, error = %e, "Page request failed; keeping what was collected");
                stop = PageStop::FetchFailed;
                break;
            }
        };
        pages = page;

        let batch = plan.source.extract(&markup);
        if batch.is_empty() {
            info!(page, "No items on page; stopping");
            stop = PageStop::EmptyPage;
            break;
        }
        let parsed = batch.len();
        let added = acc.merge(batch);
        info!(page, parsed, added, collected = acc.len(), "Page merged");

        match plan.source.next_page_url(&markup, &url) {
            Some(next) => url = next,
            None => {
                info!(page, "No further pages");
                stop = PageStop::NoNextLink;
                break;
            }
        }
    }

    if acc.is_empty() {
        warn!(pages, stop = ?stop, "Pagination collected nothing");
    } else {
        info!(pages, collected = acc.len(), stop = ?stop, "Pagination finished");
    }
    PaginationReport {
        items: acc.finalize(None),
        pages,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages; unknown URLs fail like a dead connection.
    struct FakeFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, m)| (u.to_string(), m.to_string()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| format!("connection refused: {url}").into())
        }
    }

    /// Items are `title|date` lines; a line `next=<url>` links the next page.
    struct LineSource;

    impl ItemExtractor for LineSource {
        fn extract(&self, markup: &str) -> Vec<NewsItem> {
            markup
                .lines()
                .filter_map(|l| l.split_once('|'))
                .map(|(t, d)| NewsItem::new(d, t))
                .collect()
        }
    }

    impl PagedSource for LineSource {
        fn next_page_url(&self, markup: &str, _current_url: &str) -> Option<String> {
            markup
                .lines()
                .find_map(|l| l.strip_prefix("next="))
                .map(str::to_string)
        }
    }

    fn plan(max_pages: usize) -> PaginationPlan {
        PaginationPlan {
            site: "test",
            start_url: "p1".into(),
            source: Box::new(LineSource),
            config: PaginationConfig {
                max_pages,
                ..PaginationConfig::default()
            },
        }
    }

    fn titles(items: &[NewsItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_follows_links_until_none_left() {
        let fetcher = FakeFetcher::new(&[
            ("p1", "A|1\nB|1\nnext=p2"),
            ("p2", "B|1\nC|2\nnext=p3"),
            ("p3", "D|3"),
        ]);
        let report = paginate(&fetcher, &plan(50)).await;
        assert_eq!(titles(&report.items), vec!["A", "B", "C", "D"]);
        assert_eq!(report.pages, 3);
        assert_eq!(report.stop, PageStop::NoNextLink);
    }

    #[tokio::test]
    async fn test_empty_page_stops() {
        let fetcher = FakeFetcher::new(&[("p1", "A|1\nnext=p2"), ("p2", "next=p3"), ("p3", "Z|9")]);
        let report = paginate(&fetcher, &plan(50)).await;
        assert_eq!(titles(&report.items), vec!["A"]);
        assert_eq!(report.stop, PageStop::EmptyPage);
        assert_eq!(fetcher.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_collected_items() {
        let fetcher = FakeFetcher::new(&[("p1", "A|1\nnext=p2"), ("p2", "B|1\nnext=gone")]);
        let report = paginate(&fetcher, &plan(50)).await;
        assert_eq!(titles(&report.items), vec!["A", "B"]);
        assert_eq!(report.pages, 2);
        assert_eq!(report.stop, PageStop::FetchFailed);
    }

    #[tokio::test]
    async fn test_page_cap() {
        let fetcher = FakeFetcher::new(&[("p1", "A|1\nnext=p2"), ("p2", "B|1\nnext=p1")]);
        let report = paginate(&fetcher, &plan(3)).await;
        assert_eq!(report.pages, 3);
        assert_eq!(report.stop, PageStop::PageCap);
        assert_eq!(titles(&report.items), vec!["A", "B"]);
    }
}
