//! Interfax business feed.
//!
//! The feed at <https://www.interfax.ru/business/> is a list of `div.timeline`
//! blocks. Each block pairs `<time datetime="...">` elements with links of
//! the form `/business/1012345` whose `h3` holds the headline. "Load more"
//! (`div.timeline__more`) appends further blocks, so every block is parsed.

use crate::dates::{DatePrecision, normalize};
use crate::extract::{ItemExtractor, SkipCounts, element_text, parent_element};
use crate::harvest::{HarvestConfig, HarvestPlan};
use crate::locator::{Locator, LocatorCascade, SelectorStrategy};
use crate::models::NewsItem;
use crate::utils::clean_text;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;

pub const START_URL: &str = "https://www.interfax.ru/business/";
pub const OUTPUT_FILE: &str = "interfax.csv";

static TIMELINE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.timeline").unwrap());
static DATED: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").unwrap());

/// Article paths, relative or absolute, in the sections the feed mixes in.
static ARTICLE_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://[^/]+)?/(?:business|world|russia|moscow|digital|news|culture)/\d+")
        .unwrap()
});

pub struct InterfaxExtractor;

impl ItemExtractor for InterfaxExtractor {
    fn extract(&self, markup: &str) -> Vec<NewsItem> {
        let doc = Html::parse_document(markup);
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut skips = SkipCounts::default();
        let mut candidates = 0;

        for timeline in doc.select(&TIMELINE) {
            for time in timeline.select(&DATED) {
                candidates += 1;
                let datetime = time.value().attr("datetime").unwrap_or_default().trim();
                if datetime.is_empty() {
                    skips.no_date += 1;
                    continue;
                }
                let Some(block) = parent_element(&time) else {
                    skips.no_link += 1;
                    continue;
                };
                let Some(link) = block.select(&LINK).find(|a| {
                    a.value()
                        .attr("href")
                        .is_some_and(|href| ARTICLE_HREF.is_match(href))
                }) else {
                    skips.no_link += 1;
                    continue;
                };

                let title = match link.value().attr("title").map(clean_text) {
                    Some(t) if !t.is_empty() => t,
                    _ => link
                        .select(&HEADLINE)
                        .next()
                        .map(|h3| clean_text(&element_text(&h3)))
                        .unwrap_or_default(),
                };
                if title.is_empty() {
                    skips.no_title += 1;
                    continue;
                }

                let item = NewsItem::new(normalize(datetime, DatePrecision::Minute), title);
                if seen.insert(item.key()) {
                    items.push(item);
                }
            }
        }

        skips.log("interfax", candidates, items.len());
        items
    }
}

pub fn plan() -> HarvestPlan {
    let cascade = LocatorCascade::new()
        .then(SelectorStrategy::new(Locator::css("div.timeline__more")))
        .then(
            SelectorStrategy::new(Locator::xpath("//div[contains(., 'Загрузить еще новости')]"))
                .with_class_hint("timeline__more"),
        );

    HarvestPlan {
        site: "interfax",
        url: START_URL.to_string(),
        extractor: Box::new(InterfaxExtractor),
        cascade,
        ready_marker: Locator::css("div.timeline"),
        date_marker: Locator::css("div.timeline time[datetime]"),
        config: HarvestConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"
        <div class="timeline">
          <div>
            <time datetime="2026-02-05T12:18">12:18</time>
            <a href="/business/1012345"><h3>Сбербанк &amp; ВТБ снизили ставки</h3></a>
          </div>
          <div>
            <time datetime="2026-02-05T11:40">11:40</time>
            <a href="/tags/banks">Банки</a>
            <a href="https://www.interfax.ru/world/1012340" title="Нефть Brent подорожала"><h3>Нефть</h3></a>
          </div>
          <div>
            <time datetime="2026-02-05T11:00">11:00</time>
            <a href="/photo/55">Фото дня</a>
          </div>
        </div>
        <div class="timeline__more">Загрузить еще новости</div>
        <div class="timeline">
          <div>
            <time datetime="2026-02-05T12:18">12:18</time>
            <a href="/business/1012345"><h3>Сбербанк &amp; ВТБ снизили ставки</h3></a>
          </div>
          <div>
            <time datetime="2026-02-04T18:05:00+03:00">18:05</time>
            <a href="/russia/1012200"><h3>  Минфин   разместил ОФЗ </h3></a>
          </div>
        </div>
    "#;

    #[test]
    fn test_extracts_all_timeline_blocks() {
        let items = InterfaxExtractor.extract(FEED);
        assert_eq!(
            items,
            vec![
                NewsItem::new("2026-02-05 12:18", "Сбербанк & ВТБ снизили ставки"),
                NewsItem::new("2026-02-05 11:40", "Нефть Brent подорожала"),
                NewsItem::new("2026-02-04 18:05", "Минфин разместил ОФЗ"),
            ]
        );
    }

    #[test]
    fn test_times_outside_timeline_are_ignored() {
        let markup = r#"<aside><time datetime="2026-02-05T09:00">9</time>
            <a href="/business/1"><h3>Сайдбар</h3></a></aside>"#;
        assert!(InterfaxExtractor.extract(markup).is_empty());
    }

    #[test]
    fn test_empty_headline_is_skipped() {
        let markup = r#"<div class="timeline"><div>
            <time datetime="2026-02-05T09:00">9</time>
            <a href="/business/1"><h3>   </h3></a></div></div>"#;
        assert!(InterfaxExtractor.extract(markup).is_empty());
    }

    #[test]
    fn test_plan_cascade_order() {
        let plan = plan();
        assert_eq!(plan.cascade.len(), 2);
        assert_eq!(plan.config.trigger_miss_limit, 3);
        assert!(plan.config.probe_fractions.is_empty());
    }
}
