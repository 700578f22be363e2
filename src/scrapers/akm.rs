//! AKM news list.
//!
//! <https://www.akm.ru/news/> is server-rendered. Each page lists
//! `div.b-section-item` blocks, and the "Загрузить еще" anchor at the bottom
//! links the next page, so plain HTTP requests are enough.
//!
//! Dates are published as free Russian text (`05 февраля 2026 12:18`) and are
//! kept as published when they are not in a recognized format.

use crate::dates::{DatePrecision, normalize};
use crate::extract::{ItemExtractor, SkipCounts, element_text};
use crate::models::NewsItem;
use crate::paginate::{PagedSource, PaginationConfig, PaginationPlan};
use crate::utils::{clean_text, contains_any};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

pub const START_URL: &str = "https://www.akm.ru/news/";
pub const OUTPUT_FILE: &str = "akm.csv";

static DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div[class]").unwrap());
static TITLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.b-section-item__title a").unwrap());
static META_SPAN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.b-section-item__meta span").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
/// Tested per class token. Modifiers like `b-section-item--wide` count,
/// BEM elements like `b-section-item__title` don't.
static ITEM_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bb-section-item\b").unwrap());

pub struct AkmSource;

impl ItemExtractor for AkmSource {
    fn extract(&self, markup: &str) -> Vec<NewsItem> {
        let doc = Html::parse_document(markup);
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut skips = SkipCounts::default();
        let mut candidates = 0;

        let blocks = doc
            .select(&DIV)
            .filter(|div| div.value().classes().any(|class| ITEM_CLASS.is_match(class)));
        for block in blocks {
            candidates += 1;
            let title = block
                .select(&TITLE_LINK)
                .next()
                .map(|a| clean_text(&element_text(&a)))
                .unwrap_or_default();
            if title.is_empty() {
                skips.no_title += 1;
                continue;
            }

            // The last span carries the full date-time; earlier ones hold the rubric.
            let date = block
                .select(&META_SPAN)
                .last()
                .map(|span| element_text(&span))
                .unwrap_or_default();
            if date.is_empty() {
                skips.no_date += 1;
                continue;
            }

            let item = NewsItem::new(normalize(&date, DatePrecision::Minute), title);
            if seen.insert(item.key()) {
                items.push(item);
            }
        }

        skips.log("akm", candidates, items.len());
        items
    }
}

impl PagedSource for AkmSource {
    fn next_page_url(&self, markup: &str, current_url: &str) -> Option<String> {
        let doc = Html::parse_document(markup);
        let load_more = doc
            .select(&ANCHOR)
            .find(|a| a.value().id().is_some_and(|id| id.contains("_loadmore")))
            .or_else(|| {
                doc.select(&ANCHOR)
                    .find(|a| contains_any(&element_text(a), &["загрузить еще"]))
            })?;

        let href = load_more.value().attr("href").filter(|h| !h.trim().is_empty())?;
        let next = Url::parse(current_url).ok()?.join(href.trim()).ok()?;
        Some(next.to_string())
    }
}

pub fn plan() -> PaginationPlan {
    PaginationPlan {
        site: "akm",
        start_url: START_URL.to_string(),
        source: Box::new(AkmSource),
        config: PaginationConfig::default(),
    }
}
