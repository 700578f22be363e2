//! Finam analysis feed.
//!
//! <https://www.finam.ru/analysis/united/> has no per-item date element. The
//! extractor works from links alone: each article URL embeds its publication
//! time as `-YYYYMMDD-HHMM/`, and the same URL usually appears several times
//! (headline, teaser, "read more"), so the best text per URL is kept.

use crate::dates::date_from_url;
use crate::extract::{ItemExtractor, TitleRules, element_text, parent_element};
use crate::harvest::{HarvestConfig, HarvestPlan};
use crate::locator::{Keywords, Locator, LocatorCascade, ScanStrategy, SelectorStrategy};
use crate::models::NewsItem;
use crate::utils::{char_len, clean_text};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

pub const BASE_URL: &str = "https://www.finam.ru/";
pub const START_URL: &str = "https://www.finam.ru/analysis/united/";
pub const OUTPUT_FILE: &str = "finam.csv";

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static ARTICLE_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/publications/item/|bonds\.finam\.ru/(?:news|comments)/item/").unwrap()
});
static BASE: Lazy<Url> = Lazy::new(|| Url::parse(BASE_URL).unwrap());

/// Texts shorter than this send the extractor looking for a better one.
const MIN_TEXT_LEN: usize = 5;
const TITLE_RULES: TitleRules = TitleRules::min_len(1).with_navigation_filter();

const LOAD_MORE: Keywords = Keywords {
    verbs: &["загрузить", "показать"],
    qualifiers: &["еще", "ещё"],
};
const LOAD_OR_SHOW: Keywords = Keywords {
    verbs: &["загрузить", "показать"],
    qualifiers: &[],
};

const LOAD_MORE_XPATHS: &[&str] = &[
    "//a[contains(translate(text(), 'АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ', 'абвгдеёжзийклмнопрстуфхцчшщъыьэюя'), 'загрузить ещё')]",
    "//a[contains(translate(text(), 'АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ', 'абвгдеёжзийклмнопрстуфхцчшщъыьэюя'), 'загрузить еще')]",
    "//a[contains(translate(text(), 'АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ', 'абвгдеёжзийклмнопрстуфхцчшщъыьэюя'), 'показать ещё')]",
    "//a[contains(translate(text(), 'АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ', 'абвгдеёжзийклмнопрстуфхцчшщъыьэюя'), 'показать еще')]",
    "//a[contains(text(), 'Загрузить')]",
    "//a[contains(text(), 'Показать')]",
    "//button[contains(text(), 'Загрузить')]",
    "//button[contains(text(), 'Показать')]",
    "//*[contains(@class, 'load')]//a",
    "//*[contains(@class, 'more')]//a",
    "//*[contains(@id, 'load')]//a",
    "//*[contains(@id, 'more')]//a",
];

/// Best title seen so far for one article URL.
struct Record {
    date: String,
    title: String,
}

impl Record {
    /// Keep `text` if it is clearly a fuller version of the current title.
    fn offer(&mut self, text: String) {
        let new_len = char_len(&text);
        let kept_len = char_len(&self.title);
        if new_len > kept_len && (new_len as f64 > kept_len as f64 * 1.2 || kept_len < 10) {
            self.title = text;
        }
    }
}

/// Second-to-last `/` segment of `href` (the slug of `/path/slug/`), or the
/// whole href when it has no slash.
fn url_slug(href: &str) -> &str {
    if href.contains('/') {
        href.rsplit('/').nth(1).unwrap_or_default()
    } else {
        href
    }
}

/// Display text for an article link, trying progressively weaker sources.
fn link_text(a: &ElementRef, href: &str) -> String {
    let mut text = clean_text(&element_text(a));

    if char_len(&text) < MIN_TEXT_LEN {
        if let Some(parent) = parent_element(a) {
            let parent_text = clean_text(&element_text(&parent));
            if char_len(&parent_text) > char_len(&text) && char_len(&parent_text) > 10 {
                text = parent_text;
            }
        }
    }

    if char_len(&text) < MIN_TEXT_LEN {
        let attr = clean_text(a.value().attr("title").unwrap_or_default());
        if char_len(&attr) > MIN_TEXT_LEN {
            text = attr;
        }
    }

    if char_len(&text) < MIN_TEXT_LEN {
        text = url_slug(href).to_string();
    }
    text
}

pub struct FinamExtractor;

impl ItemExtractor for FinamExtractor {
    fn extract(&self, markup: &str) -> Vec<NewsItem> {
        let doc = Html::parse_document(markup);
        let mut order: Vec<String> = Vec::new();
        let mut records: HashMap<String, Record> = HashMap::new();
        let mut candidates = 0;
        let mut navigation = 0;

        for a in doc.select(&LINK) {
            let href = a.value().attr("href").unwrap_or_default();
            if !ARTICLE_HREF.is_match(href) {
                continue;
            }
            candidates += 1;
            let Ok(full_url) = BASE.join(href) else {
                continue;
            };
            let full_url = full_url.to_string();

            let text = link_text(&a, href);
            if !TITLE_RULES.accepts(&text) {
                navigation += 1;
                continue;
            }

            let record = records.entry(full_url.clone()).or_insert_with(|| {
                order.push(full_url.clone());
                Record {
                    date: date_from_url(&full_url),
                    title: String::new(),
                }
            });
            record.offer(text);
        }

        let items: Vec<NewsItem> = order
            .iter()
            .filter_map(|url| {
                let record = records.remove(url)?;
                let title = if record.title.is_empty() {
                    url_slug(url).to_string()
                } else {
                    record.title
                };
                (!title.is_empty()).then(|| NewsItem::new(record.date, title))
            })
            .unique_by(|item| item.key())
            .collect();

        debug!(
            site = "finam",
            candidates,
            navigation,
            urls = order.len(),
            extracted = items.len(),
            "Extraction diagnostics"
        );
        items
    }
}

pub fn plan() -> HarvestPlan {
    let mut cascade = LocatorCascade::new();
    for label in ["Загрузить ещё", "Загрузить еще", "Показать ещё", "Показать еще"] {
        cascade = cascade.then(SelectorStrategy::new(Locator::link_text(label)));
    }
    for partial in ["Загрузить", "Показать"] {
        cascade = cascade
            .then(SelectorStrategy::new(Locator::partial_link_text(partial)).with_keywords(LOAD_OR_SHOW));
    }
    for xpath in LOAD_MORE_XPATHS {
        cascade = cascade.then(SelectorStrategy::new(Locator::xpath(xpath)).requiring_text());
    }
    let cascade = cascade.then(ScanStrategy::new("a", LOAD_MORE));

    HarvestPlan {
        site: "finam",
        url: START_URL.to_string(),
        extractor: Box::new(FinamExtractor),
        cascade,
        ready_marker: Locator::tag("body"),
        date_marker: Locator::css("a[href*='/publications/item/']"),
        config: HarvestConfig {
            target_count: 3_000,
            max_rounds: 60,
            trigger_miss_limit: 5,
            initial_wait_ms: 8_000,
            ..HarvestConfig::default()
        },
    }
}
