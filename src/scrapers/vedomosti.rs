//! Vedomosti section feeds (`/business`, `/economics`).
//!
//! Cards render as `card-news-item` / `article-preview-item` blocks with a
//! `<time>` and a title link, but freshly loaded cards do not always keep
//! that layout. Extraction therefore runs two passes over each snapshot:
//!
//! 1. **Direct**: start from every `<time>`, find its card, take the title link
//! 2. **Inverse**: start from every section link, walk up to the nearest
//!    `<time>` that parses as a date
//!
//! Both passes share one dedup set, so a card found twice is emitted once.
//!
//! On the business feed the "Показать еще" button is sometimes positioned
//! above the viewport after a scroll to the bottom, so that section also
//! probes the cascade at several heights.

use crate::dates::{DatePrecision, recognize};
use crate::extract::{
    ItemExtractor, SkipCounts, TitleRules, ancestor_elements, class_contains, element_text,
    is_junk_href, link_title, parent_element,
};
use crate::harvest::{HarvestConfig, HarvestPlan};
use crate::locator::{Keywords, Locator, LocatorCascade, ScanStrategy, SelectorStrategy};
use crate::models::{ItemKey, NewsItem};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").unwrap());

const CARD_CLASSES: &[&str] = &["card-news-item", "card-mobile-news", "article-preview-item"];
const TITLE_CLASSES: &[&str] = &["card-news-item__title", "article-preview-item__title"];
const TITLE_RULES: TitleRules = TitleRules::min_len(2);
/// How far the inverse pass climbs from a link looking for its date.
const MAX_DATE_CLIMB: usize = 10;

const SHOW_MORE: Keywords = Keywords {
    verbs: &["показать"],
    qualifiers: &["еще", "ещё"],
};

/// Structural fallbacks for the "Показать еще" button.
const SHOW_MORE_XPATHS: &[&str] = &[
    "//button[contains(@class, 'articles-preview-list__button')]",
    "//button[contains(@class, 'articles-preview-list__button')]//span[contains(text(), 'Показать еще')]",
    "//button[contains(@class, 'articles-preview-list__button')]//span[contains(text(), 'Показать ещё')]",
    "//button[contains(translate(., 'АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ', 'абвгдеёжзийклмнопрстуфхцчшщъыьэюя'), 'показать еще')]",
    "//a[contains(translate(text(), 'АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ', 'абвгдеёжзийклмнопрстуфхцчшщъыьэюя'), 'показать еще')]",
    "//a[contains(translate(text(), 'АБВГДЕЁЖЗИЙКЛМНОПРСТУФХЦЧШЩЪЫЬЭЮЯ', 'абвгдеёжзийклмнопрстуфхцчшщъыьэюя'), 'показать ещё')]",
    "//*[contains(@class, 'show-more')]//a",
    "//*[contains(@class, 'card-list__show-more')]",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Business,
    Economics,
}

impl Section {
    pub fn name(self) -> &'static str {
        match self {
            Section::Business => "vedomosti-business",
            Section::Economics => "vedomosti-economics",
        }
    }

    pub fn start_url(self) -> &'static str {
        match self {
            Section::Business => "https://www.vedomosti.ru/business",
            Section::Economics => "https://www.vedomosti.ru/economics",
        }
    }

    pub fn output_file(self) -> &'static str {
        match self {
            Section::Business => "vedomosti_business.csv",
            Section::Economics => "vedomosti_economics.csv",
        }
    }

    /// Scroll positions to retry the cascade at when the button is not found
    /// at the bottom.
    fn probe_fractions(self) -> Vec<f64> {
        match self {
            Section::Business => vec![0.9, 0.8, 0.7, 0.6, 0.5],
            Section::Economics => Vec::new(),
        }
    }

    /// Path fragments identifying this section's articles.
    fn paths(self) -> &'static [&'static str] {
        match self {
            Section::Business => &["/business/", "/finance/"],
            Section::Economics => &["/economics/"],
        }
    }
}

pub struct VedomostiExtractor {
    section: Section,
}

impl VedomostiExtractor {
    pub fn new(section: Section) -> Self {
        Self { section }
    }

    fn in_section(&self, href: &str) -> bool {
        self.section.paths().iter().any(|p| href.contains(p))
    }

    /// Whether a link found next to a date plausibly points at an article.
    fn is_article_href(&self, href: &str) -> bool {
        self.in_section(href)
            || href.contains("/news/")
            || href.contains("/articles/")
            || (href.starts_with('/') && href.len() > 10 && !is_junk_href(href))
    }

    fn direct_pass(
        &self,
        doc: &Html,
        seen: &mut HashSet<ItemKey>,
        items: &mut Vec<NewsItem>,
        skips: &mut SkipCounts,
    ) -> usize {
        let mut candidates = 0;
        for time in doc.select(&TIME) {
            candidates += 1;
            let Some(date) = time_date(&time) else {
                skips.no_date += 1;
                continue;
            };
            let Some(parent) = parent_element(&time) else {
                skips.no_link += 1;
                continue;
            };
            let Some(link) = title_link(&parent) else {
                skips.no_link += 1;
                continue;
            };

            let href = link.value().attr("href").unwrap_or_default();
            if href.is_empty() || !self.is_article_href(href) {
                skips.bad_href += 1;
                continue;
            }

            let title = link_title(&link);
            if !TITLE_RULES.accepts(&title) {
                skips.no_title += 1;
                continue;
            }

            let item = NewsItem::new(date, title);
            if seen.insert(item.key()) {
                items.push(item);
            }
        }
        candidates
    }

    fn inverse_pass(
        &self,
        doc: &Html,
        seen: &mut HashSet<ItemKey>,
        items: &mut Vec<NewsItem>,
        skips: &mut SkipCounts,
    ) {
        for link in doc.select(&LINK) {
            let href = link.value().attr("href").unwrap_or_default();
            if !self.in_section(href) || is_junk_href(href) {
                continue;
            }
            let title = link_title(&link);
            if !TITLE_RULES.accepts(&title) {
                continue;
            }

            let date = parent_element(&link).and_then(|start| {
                std::iter::once(start)
                    .chain(ancestor_elements(&start))
                    .take(MAX_DATE_CLIMB)
                    .find_map(|level| level.select(&TIME).next().and_then(|t| time_date(&t)))
            });

            if let Some(date) = date {
                let item = NewsItem::new(date, title);
                if seen.insert(item.key()) {
                    items.push(item);
                    skips.recovered += 1;
                }
            }
        }
    }
}

impl ItemExtractor for VedomostiExtractor {
    fn extract(&self, markup: &str) -> Vec<NewsItem> {
        let doc = Html::parse_document(markup);
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut skips = SkipCounts::default();

        let candidates = self.direct_pass(&doc, &mut seen, &mut items, &mut skips);
        self.inverse_pass(&doc, &mut seen, &mut items, &mut skips);

        skips.log(self.section.name(), candidates, items.len());
        items
    }
}

/// Day-precision date from a `<time>`'s `datetime`, else its text.
fn time_date(time: &ElementRef) -> Option<String> {
    let raw = match time.value().attr("datetime").map(str::trim) {
        Some(attr) if !attr.is_empty() => attr.to_string(),
        _ => element_text(time),
    };
    if raw.is_empty() {
        return None;
    }
    recognize(&raw, DatePrecision::Day)
}

/// The title link for a date whose parent element is `parent`.
fn title_link<'a>(parent: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let card = ancestor_elements(parent)
        .find(|el| class_contains(el, CARD_CLASSES))
        .or_else(|| ancestor_elements(parent).find(|el| class_contains(el, &["card"])))
        .unwrap_or(*parent);

    let in_title_div = card
        .select(&DIV)
        .find(|div| class_contains(div, TITLE_CLASSES))
        .and_then(|div| div.select(&LINK).next());
    if in_title_div.is_some() {
        return in_title_div;
    }
    if let Some(link) = card.select(&LINK).next() {
        return Some(link);
    }

    std::iter::once(*parent)
        .chain(ancestor_elements(parent).take(2))
        .find_map(|level| level.select(&LINK).next())
}

pub fn plan(section: Section) -> HarvestPlan {
    let mut cascade = LocatorCascade::new()
        .then(SelectorStrategy::new(Locator::css("button.articles-preview-list__button")))
        .then(SelectorStrategy::new(Locator::link_text("Показать еще")))
        .then(SelectorStrategy::new(Locator::link_text("Показать ещё")))
        .then(SelectorStrategy::new(Locator::partial_link_text("Показать")).with_keywords(SHOW_MORE));
    for xpath in SHOW_MORE_XPATHS {
        cascade = cascade.then(SelectorStrategy::new(Locator::xpath(xpath)));
    }
    let cascade = cascade
        .then(ScanStrategy::new("button", SHOW_MORE))
        .then(ScanStrategy::new("a", SHOW_MORE));

    HarvestPlan {
        site: section.name(),
        url: section.start_url().to_string(),
        extractor: Box::new(VedomostiExtractor::new(section)),
        cascade,
        ready_marker: Locator::css("time.card-news-item__date"),
        date_marker: Locator::tag("time"),
        config: HarvestConfig {
            probe_fractions: section.probe_fractions(),
            ..HarvestConfig::default()
        },
    }
}
