//! Deduplicating, insertion-ordered collection of harvested items.
//!
//! Both harvesting variants feed every round's extraction into an
//! [`Accumulator`]. An item is admitted only the first time its
//! `(date, title)` key is seen, so order reflects first sighting across
//! rounds rather than publication order.

use crate::models::{ItemKey, NewsItem};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Accumulator {
    items: Vec<NewsItem>,
    seen: HashSet<ItemKey>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `item` if its key is unseen. Returns `true` when it was appended.
    pub fn admit(&mut self, item: NewsItem) -> bool {
        if self.seen.insert(item.key()) {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    /// Merge one round's extraction, returning how many items were new.
    ///
    /// Merging the same batch twice admits nothing the second time.
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = NewsItem>,
    {
        batch
            .into_iter()
            .map(|item| self.admit(item))
            .filter(|admitted| *admitted)
            .count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the accumulator, keeping at most `target` items in first-seen order.
    pub fn finalize(self, target: Option<usize>) -> Vec<NewsItem> {
        let mut items = self.items;
        if let Some(limit) = target {
            items.truncate(limit);
        }
        items
    }
}
