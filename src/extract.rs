//! Shared pieces of the per-site item extractors.
//!
//! Every site module implements [`ItemExtractor`] on top of the same few
//! building blocks: text collection that mirrors what a reader sees,
//! class-token matching, bounded ancestor walks, and [`TitleRules`] for
//! rejecting navigation fragments that look like headlines.

use crate::models::NewsItem;
use crate::utils::{char_len, clean_text, contains_any};
use itertools::Itertools;
use scraper::ElementRef;
use tracing::debug;

/// Turns one page snapshot into headline candidates.
///
/// Implementations never fail: anything that cannot be parsed is skipped.
/// Results are in document order, have non-empty titles, and contain no two
/// items with the same `(date, title)` key.
pub trait ItemExtractor: Send + Sync {
    fn extract(&self, markup: &str) -> Vec<NewsItem>;
}

/// Length and boilerplate filters applied to candidate titles.
#[derive(Debug, Clone, Copy)]
pub struct TitleRules {
    /// Titles with fewer characters are dropped.
    pub min_len: usize,
    /// Lowercase phrases marking "read more" style links.
    pub navigation: &'static [&'static str],
    /// Titles at least this long are kept even if they contain a navigation phrase.
    pub navigation_max_len: usize,
}

/// Fragments that label links rather than articles.
pub const NAVIGATION_PHRASES: &[&str] = &["читать далее", "подробнее", "→", ">"];

impl TitleRules {
    pub const fn min_len(min_len: usize) -> Self {
        Self {
            min_len,
            navigation: &[],
            navigation_max_len: 20,
        }
    }

    pub const fn with_navigation_filter(mut self) -> Self {
        self.navigation = NAVIGATION_PHRASES;
        self
    }

    pub fn accepts(&self, title: &str) -> bool {
        let len = char_len(title);
        if len < self.min_len {
            return false;
        }
        !(len < self.navigation_max_len && contains_any(title, self.navigation))
    }
}

/// Per-reason counts of candidates an extractor had to drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipCounts {
    pub no_date: usize,
    pub no_link: usize,
    pub bad_href: usize,
    pub no_title: usize,
    /// Items found only by walking up from a link to its date.
    pub recovered: usize,
}

impl SkipCounts {
    pub fn log(&self, site: &str, candidates: usize, extracted: usize) {
        debug!(
            site,
            candidates,
            extracted,
            no_date = self.no_date,
            no_link = self.no_link,
            bad_href = self.bad_href,
            no_title = self.no_title,
            recovered = self.recovered,
            "Extraction diagnostics"
        );
    }
}

/// Visible text of `el`: text nodes trimmed, empties dropped, joined by spaces.
pub fn element_text(el: &ElementRef) -> String {
    el.text().map(str::trim).filter(|s| !s.is_empty()).join(" ")
}

/// Link text, falling back to the `title` attribute, cleaned for output.
pub fn link_title(a: &ElementRef) -> String {
    let text = element_text(a);
    if !text.is_empty() {
        return clean_text(&text);
    }
    clean_text(a.value().attr("title").unwrap_or_default())
}

/// `true` if any class token of `el` contains one of `fragments`.
pub fn class_contains(el: &ElementRef, fragments: &[&str]) -> bool {
    el.value()
        .classes()
        .any(|class| fragments.iter().any(|f| class.contains(f)))
}

/// Parent element of `el`, skipping the document node.
pub fn parent_element<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.parent().and_then(ElementRef::wrap)
}

/// Ancestors of `el` (nearest first), elements only.
pub fn ancestor_elements<'a>(el: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.ancestors().filter_map(ElementRef::wrap)
}

/// `true` for hrefs that point nowhere useful.
pub fn is_junk_href(href: &str) -> bool {
    ["#", "javascript:", "mailto:", "tel:"]
        .iter()
        .any(|marker| href.contains(marker))
}
