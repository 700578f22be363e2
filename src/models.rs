//! Data models for harvested news items.
//!
//! - [`NewsItem`]: one headline with its publication date, as written to CSV
//! - [`ItemKey`]: the `(date, title)` identity used for deduplication
//!
//! Items carry no article id; two items with the same date and title are the
//! same article as far as every harvester is concerned.

use serde::{Deserialize, Serialize};

/// A single harvested headline.
///
/// Field order matches the output column order (`date,title`), so the CSV
/// writer can serialize items directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewsItem {
    /// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, an empty string, or the site's
    /// free-text date when it could not be normalized.
    pub date: String,
    /// Trimmed, entity-decoded headline text. Never empty.
    pub title: String,
}

/// Identity of a [`NewsItem`].
pub type ItemKey = (String, String);

impl NewsItem {
    pub fn new(date: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            title: title.into(),
        }
    }

    /// The `(date, title)` pair used to decide whether two items are the same article.
    pub fn key(&self) -> ItemKey {
        (self.date.clone(), self.title.clone())
    }
}
