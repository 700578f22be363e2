//! Incremental harvesting of infinite-scroll news feeds.
//!
//! The sites driven here virtualize their feeds: once enough items are
//! loaded, older nodes leave the DOM. Parsing only the final page would lose
//! most of the feed, so every round re-parses the *whole* current snapshot
//! and merges it into an [`Accumulator`].
//!
//! # Round Structure
//!
//! 1. Scroll to 70% of the page, then to the bottom (some lazy loaders only
//!    fire on intermediate positions)
//! 2. Locate the "load more" control through the site's [`LocatorCascade`],
//!    retrying at the configured probe positions
//! 3. Activate it and let the page settle: detect a collapsed page height,
//!    oscillate the scroll position so virtualized rows mount, wait for a
//!    date marker
//! 4. Extract the current snapshot and merge
//! 5. Evaluate the stop conditions
//!
//! # Stop Conditions
//!
//! | Reason | Trigger |
//! |--------|---------|
//! | [`StopReason::TargetReached`] | accumulator holds `target_count` items |
//! | [`StopReason::RoundBudget`] | `max_rounds` rounds ran |
//! | [`StopReason::TriggerMissing`] | control not found `trigger_miss_limit` rounds in a row |
//! | [`StopReason::Stalled`] | markers and parsed items both far below the collected count |
//! | [`StopReason::Exhausted`] | the zero-yield retry confirmed the feed ran out |

use crate::accumulator::Accumulator;
use crate::browser::{BrowserSession, SessionResult, count_matches, wait_for_marker};
use crate::extract::ItemExtractor;
use crate::locator::{Locator, LocatorCascade, Trigger};
use crate::models::NewsItem;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Tunables for one interactive site.
///
/// The defaults were tuned by trial against the live feeds; sites adjust a
/// few of them and the settings file may override any field. Durations are
/// in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    pub target_count: usize,
    pub max_rounds: usize,
    pub trigger_miss_limit: usize,
    /// Pause after navigation before looking for content.
    pub initial_wait_ms: u64,
    /// How long to wait for the first date marker after navigation.
    pub ready_timeout_ms: u64,
    pub partial_scroll_fraction: f64,
    pub partial_scroll_pause_ms: u64,
    pub bottom_scroll_pause_ms: u64,
    /// Scroll positions at which the cascade is retried when the control
    /// is not found at the bottom.
    pub probe_fractions: Vec<f64>,
    pub probe_pause_ms: u64,
    /// Pause between scrolling the control into view and clicking it.
    pub activation_pause_ms: u64,
    pub render_settle_ms: u64,
    /// A page shorter than this fraction of its pre-click height was reset.
    pub height_collapse_ratio: f64,
    pub rescroll_pause_ms: u64,
    pub scroll_oscillations: usize,
    pub oscillation_pause_ms: u64,
    pub marker_wait_ms: u64,
    pub marker_poll_ms: u64,
    pub post_mount_pause_ms: u64,
    /// Stall detection stays off until more than this many items are collected.
    pub stall_floor: usize,
    pub stall_ratio: f64,
    pub exhausted_ratio: f64,
    pub retry_pause_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target_count: 10_000,
            max_rounds: 500,
            trigger_miss_limit: 3,
            initial_wait_ms: 5_000,
            ready_timeout_ms: 15_000,
            partial_scroll_fraction: 0.7,
            partial_scroll_pause_ms: 1_000,
            bottom_scroll_pause_ms: 2_000,
            probe_fractions: Vec::new(),
            probe_pause_ms: 1_000,
            activation_pause_ms: 800,
            render_settle_ms: 2_000,
            height_collapse_ratio: 0.5,
            rescroll_pause_ms: 2_000,
            scroll_oscillations: 3,
            oscillation_pause_ms: 1_000,
            marker_wait_ms: 5_000,
            marker_poll_ms: 250,
            post_mount_pause_ms: 1_500,
            stall_floor: 50,
            stall_ratio: 0.3,
            exhausted_ratio: 0.5,
            retry_pause_ms: 3_000,
        }
    }
}

/// Everything the harvester needs to know about one site.
pub struct HarvestPlan {
    pub site: &'static str,
    pub url: String,
    pub extractor: Box<dyn ItemExtractor>,
    pub cascade: LocatorCascade,
    /// Marker whose presence means the first screen of the feed rendered.
    pub ready_marker: Locator,
    /// One element per rendered item; counted for stall detection.
    pub date_marker: Locator,
    pub config: HarvestConfig,
}

/// What one round produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The snapshot was parsed; `added` items were new.
    Progressed { parsed: usize, added: usize },
    /// The control was missing for the last allowed round; nothing was parsed.
    NoTrigger,
    /// Reading the snapshot failed; the round counts as zero yield.
    ParseFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub round: usize,
    /// Strategy that located the control, if it was activated.
    pub trigger: Option<String>,
    pub outcome: RoundOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    RoundBudget,
    TriggerMissing,
    Stalled,
    Exhausted,
}

#[derive(Debug)]
pub struct HarvestReport {
    /// Collected items in first-seen order, truncated to the target.
    pub items: Vec<NewsItem>,
    pub rounds: Vec<RoundReport>,
    pub stop: StopReason,
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub struct Harvester<'a> {
    session: &'a dyn BrowserSession,
    plan: &'a HarvestPlan,
}

impl<'a> Harvester<'a> {
    pub fn new(session: &'a dyn BrowserSession, plan: &'a HarvestPlan) -> Self {
        Self { session, plan }
    }

    fn config(&self) -> &HarvestConfig {
        &self.plan.config
    }

    /// Open the feed and harvest it until a stop condition fires.
    ///
    /// Only the initial navigation can fail; everything after it is
    /// best-effort and folded into the report.
    #[instrument(level = "info", skip_all, fields(site = self.plan.site, url = %self.plan.url))]
    pub async fn run(&self) -> SessionResult<HarvestReport> {
        let cfg = self.config();
        self.session.navigate(&self.plan.url).await?;
        sleep(ms(cfg.initial_wait_ms)).await;
        if !wait_for_marker(
            self.session,
            &self.plan.ready_marker,
            ms(cfg.ready_timeout_ms),
            ms(cfg.marker_poll_ms),
        )
        .await
        {
            warn!(marker = %self.plan.ready_marker, "Feed did not render its first items in time");
        }
        let initial = count_matches(self.session, &self.plan.date_marker).await;
        info!(
            initial,
            target = cfg.target_count,
            strategies = self.plan.cascade.len(),
            "Feed opened"
        );

        Ok(self.harvest_loop().await)
    }

    async fn harvest_loop(&self) -> HarvestReport {
        let cfg = self.config();
        let mut acc = Accumulator::new();
        let mut rounds = Vec::new();
        let mut misses = 0;
        let mut stop = StopReason::RoundBudget;

        for round in 1..=cfg.max_rounds {
            self.scroll(cfg.partial_scroll_fraction, cfg.partial_scroll_pause_ms).await;
            self.scroll(1.0, cfg.bottom_scroll_pause_ms).await;

            let height_before = self.session.scroll_height().await.unwrap_or(0.0);
            let activated = match self.locate_trigger().await {
                Some(trigger) => self.activate(round, trigger).await,
                None => None,
            };

            if activated.is_some() {
                misses = 0;
                self.settle(height_before).await;
            } else {
                misses += 1;
                info!(round, misses, "Load-more control not found");
                if misses >= cfg.trigger_miss_limit {
                    info!(round, "Control missing for too many rounds; stopping");
                    rounds.push(RoundReport {
                        round,
                        trigger: None,
                        outcome: RoundOutcome::NoTrigger,
                    });
                    stop = StopReason::TriggerMissing;
                    break;
                }
            }

            let markers = count_matches(self.session, &self.plan.date_marker).await;
            let mut outcome = self.parse_into(&mut acc).await;
            let collected = acc.len() as f64;

            if let RoundOutcome::Progressed { parsed, added } = outcome {
                info!(
                    round,
                    collected = acc.len(),
                    markers,
                    parsed,
                    added,
                    "Round merged"
                );

                if acc.len() > cfg.stall_floor
                    && (markers as f64) < collected * cfg.stall_ratio
                    && (parsed as f64) < collected * cfg.stall_ratio
                {
                    warn!(
                        round,
                        markers,
                        parsed,
                        collected = acc.len(),
                        "Rendered feed is far smaller than the collection; assuming it is exhausted"
                    );
                    rounds.push(RoundReport {
                        round,
                        trigger: activated.clone(),
                        outcome,
                    });
                    stop = StopReason::Stalled;
                    break;
                }

                if activated.is_some() && added == 0 {
                    match self.retry_empty_round(&mut acc, markers).await {
                        Ok(retried) => outcome = retried,
                        Err(reason) => {
                            rounds.push(RoundReport {
                                round,
                                trigger: activated.clone(),
                                outcome,
                            });
                            info!(round, reason, "Zero-yield retry confirmed the feed is exhausted");
                            stop = StopReason::Exhausted;
                            break;
                        }
                    }
                }
            }

            rounds.push(RoundReport {
                round,
                trigger: activated,
                outcome,
            });

            if acc.len() >= cfg.target_count {
                info!(round, collected = acc.len(), "Target reached");
                stop = StopReason::TargetReached;
                break;
            }
        }

        info!(
            rounds = rounds.len(),
            collected = acc.len(),
            stop = ?stop,
            "Harvest finished"
        );
        HarvestReport {
            items: acc.finalize(Some(cfg.target_count)),
            rounds,
            stop,
        }
    }

    /// Run the cascade at the bottom of the page, then at each probe position.
    async fn locate_trigger(&self) -> Option<Trigger> {
        let cfg = self.config();
        if let Some(trigger) = self.plan.cascade.find_trigger(self.session).await {
            return Some(trigger);
        }
        for &fraction in &cfg.probe_fractions {
            self.scroll(fraction, cfg.probe_pause_ms).await;
            if let Some(trigger) = self.plan.cascade.find_trigger(self.session).await {
                debug!(fraction, strategy = %trigger.strategy, "Control found after scrolling up");
                return Some(trigger);
            }
        }
        None
    }

    /// Click `trigger`, returning the strategy label on success.
    async fn activate(&self, round: usize, trigger: Trigger) -> Option<String> {
        match LocatorCascade::activate(self.session, &trigger, ms(self.config().activation_pause_ms)).await {
            Ok(()) => {
                info!(round, strategy = %trigger.strategy, "Activated load-more control");
                Some(trigger.strategy)
            }
            Err(e) => {
                warn!(round, strategy = %trigger.strategy, error = %e, "Activating load-more control failed");
                None
            }
        }
    }

    /// Give the page time to render what the click requested.
    async fn settle(&self, height_before: f64) {
        let cfg = self.config();
        sleep(ms(cfg.render_settle_ms)).await;

        let height_after = self.session.scroll_height().await.unwrap_or(height_before);
        if height_after < height_before * cfg.height_collapse_ratio {
            warn!(height_before, height_after, "Page height collapsed; scrolling back down");
            self.scroll(1.0, cfg.rescroll_pause_ms).await;
        }

        // Virtualized rows only mount while the viewport moves over them.
        for _ in 0..cfg.scroll_oscillations {
            self.scroll(1.0, cfg.oscillation_pause_ms).await;
            self.scroll(0.9, cfg.oscillation_pause_ms / 2).await;
            self.scroll(1.0, cfg.oscillation_pause_ms).await;
        }

        wait_for_marker(
            self.session,
            &self.plan.date_marker,
            ms(cfg.marker_wait_ms),
            ms(cfg.marker_poll_ms),
        )
        .await;
        sleep(ms(cfg.post_mount_pause_ms)).await;
    }

    /// One bounded retry after a click that produced nothing new.
    ///
    /// Returns the retry's outcome, or `Err` with a reason when the page
    /// looks exhausted and the loop should stop.
    async fn retry_empty_round(
        &self,
        acc: &mut Accumulator,
        markers: usize,
    ) -> Result<RoundOutcome, &'static str> {
        let cfg = self.config();
        let collected = acc.len() as f64;

        if (markers as f64) < collected * cfg.stall_ratio {
            warn!(markers, collected = acc.len(), "Few markers rendered after click; re-scrolling");
            self.scroll(1.0, cfg.retry_pause_ms).await;
            let recount = count_matches(self.session, &self.plan.date_marker).await;
            if (recount as f64) < collected * cfg.exhausted_ratio {
                return Err("markers stayed low after re-scroll");
            }
        }

        debug!("Click added nothing; waiting and parsing again");
        sleep(ms(cfg.retry_pause_ms)).await;
        self.scroll(0.5, cfg.oscillation_pause_ms / 2).await;
        self.scroll(1.0, cfg.post_mount_pause_ms).await;

        let markers_again = count_matches(self.session, &self.plan.date_marker).await;
        let outcome = self.parse_into(acc).await;
        if let RoundOutcome::Progressed { parsed, added } = outcome {
            if added > 0 {
                info!(markers = markers_again, parsed, added, collected = acc.len(), "Delayed parse found new items");
            } else if markers_again < markers && (parsed as f64) < collected * cfg.stall_ratio {
                return Err("markers dropped and the re-parse came back short");
            }
        }
        Ok(outcome)
    }

    /// Extract the current snapshot and merge it into `acc`.
    async fn parse_into(&self, acc: &mut Accumulator) -> RoundOutcome {
        match self.session.page_source().await {
            Ok(markup) => {
                let batch = self.plan.extractor.extract(&markup);
                let parsed = batch.len();
                let added = acc.merge(batch);
                RoundOutcome::Progressed { parsed, added }
            }
            Err(e) => {
                warn!(error = %e, "Could not read page snapshot; counting the round as empty");
                RoundOutcome::ParseFailed(e.to_string())
            }
        }
    }

    async fn scroll(&self, fraction: f64, pause_ms: u64) {
        if let Err(e) = self.session.scroll_to(fraction).await {
            debug!(fraction, error = %e, "Scroll failed");
        }
        sleep(ms(pause_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeSession;
    use crate::extract::element_text;
    use crate::locator::SelectorStrategy;
    use scraper::{Html, Selector};

    /// Reads `<li><time>date</time><span>title</span></li>` rows.
    struct RowExtractor;

    impl ItemExtractor for RowExtractor {
        fn extract(&self, markup: &str) -> Vec<NewsItem> {
            let doc = Html::parse_document(markup);
            let row = Selector::parse("li").unwrap();
            let time = Selector::parse("time").unwrap();
            let span = Selector::parse("span").unwrap();
            doc.select(&row)
                .filter_map(|li| {
                    let date = li.select(&time).next().map(|t| element_text(&t))?;
                    let title = li.select(&span).next().map(|s| element_text(&s))?;
                    Some(NewsItem::new(date, title))
                })
                .collect()
        }
    }

    const BUTTON: &str = r#"<button class="more">Показать еще</button>"#;

    fn rows(titles: &[&str]) -> String {
        titles
            .iter()
            .map(|t| format!("<li><time>2026-02-05</time><span>{t}</span></li>"))
            .collect()
    }

    fn page(titles: &[&str], with_button: bool) -> String {
        format!(
            "<ul>{}</ul>{}",
            rows(titles),
            if with_button { BUTTON } else { "" }
        )
    }

    fn instant_config() -> HarvestConfig {
        HarvestConfig {
            initial_wait_ms: 0,
            ready_timeout_ms: 0,
            partial_scroll_pause_ms: 0,
            bottom_scroll_pause_ms: 0,
            probe_pause_ms: 0,
            activation_pause_ms: 0,
            render_settle_ms: 0,
            rescroll_pause_ms: 0,
            oscillation_pause_ms: 0,
            marker_wait_ms: 0,
            marker_poll_ms: 0,
            post_mount_pause_ms: 0,
            retry_pause_ms: 0,
            ..HarvestConfig::default()
        }
    }

    fn plan(config: HarvestConfig) -> HarvestPlan {
        HarvestPlan {
            site: "test",
            url: "https://news.example/feed".into(),
            extractor: Box::new(RowExtractor),
            cascade: LocatorCascade::new().then(SelectorStrategy::new(Locator::css("button.more"))),
            ready_marker: Locator::css("time"),
            date_marker: Locator::css("time"),
            config,
        }
    }

    fn titles(items: &[NewsItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_duplicates_across_rounds_and_missing_trigger_grace() {
        let session = FakeSession::new(vec![
            page(&[], true),
            page(&["A", "B"], true),
            page(&["B", "C"], false),
        ]);
        let plan = plan(instant_config());

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(titles(&report.items), vec!["A", "B", "C"]);
        assert_eq!(report.stop, StopReason::TriggerMissing);
        assert_eq!(report.rounds.len(), 5);
        assert_eq!(
            report.rounds[0].outcome,
            RoundOutcome::Progressed { parsed: 2, added: 2 }
        );
        assert_eq!(
            report.rounds[1].outcome,
            RoundOutcome::Progressed { parsed: 2, added: 1 }
        );
        assert_eq!(report.rounds[2].trigger, None);
        assert_eq!(report.rounds[4].outcome, RoundOutcome::NoTrigger);
        assert_eq!(session.visited(), vec!["https://news.example/feed".to_string()]);
    }

    #[tokio::test]
    async fn test_always_duplicate_rounds_stop_at_round_budget() {
        let session = FakeSession::new(vec![page(&[], true), page(&["A"], true)]);
        let plan = plan(HarvestConfig {
            max_rounds: 6,
            ..instant_config()
        });

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(report.stop, StopReason::RoundBudget);
        assert_eq!(report.rounds.len(), 6);
        assert_eq!(titles(&report.items), vec!["A"]);
        assert_eq!(session.clicks(), 6);
    }

    #[tokio::test]
    async fn test_target_count_stops_and_truncates() {
        let session = FakeSession::new(vec![
            page(&[], true),
            page(&["A", "B", "C", "D", "E"], true),
        ]);
        let plan = plan(HarvestConfig {
            target_count: 3,
            ..instant_config()
        });

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(report.stop, StopReason::TargetReached);
        assert_eq!(report.rounds.len(), 1);
        assert_eq!(titles(&report.items), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_stall_when_rendered_feed_shrinks() {
        let session = FakeSession::new(vec![
            page(&[], true),
            page(&["A", "B", "C", "D", "E", "F", "G", "H"], true),
            page(&["I"], true),
        ]);
        let plan = plan(HarvestConfig {
            stall_floor: 5,
            ..instant_config()
        });

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(report.stop, StopReason::Stalled);
        assert_eq!(report.rounds.len(), 2);
        assert_eq!(report.items.len(), 9);
    }

    #[tokio::test]
    async fn test_zero_yield_retry_detects_exhausted_feed() {
        let session = FakeSession::new(vec![
            page(&[], true),
            page(&["A", "B", "C", "D"], true),
            page(&["A"], true),
        ]);
        // Stall detection never fires with a high floor; the retry path has to stop the loop.
        let plan = plan(HarvestConfig {
            stall_floor: 1_000,
            ..instant_config()
        });

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.rounds.len(), 2);
        assert_eq!(titles(&report.items), vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_failed_snapshot_counts_as_empty_round() {
        // Call 0 is round one's parse.
        let session = FakeSession::new(vec![
            page(&[], true),
            page(&["A"], true),
            page(&["A", "B"], false),
        ])
        .failing_source_call(0);
        let plan = plan(HarvestConfig {
            trigger_miss_limit: 1,
            ..instant_config()
        });

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert!(matches!(
            report.rounds[0].outcome,
            RoundOutcome::ParseFailed(_)
        ));
        assert_eq!(titles(&report.items), vec!["A", "B"]);
        assert_eq!(report.stop, StopReason::TriggerMissing);
    }

    #[tokio::test]
    async fn test_rounds_scroll_partially_then_to_bottom() {
        let session = FakeSession::new(vec![page(&["A"], false)]);
        let plan = plan(HarvestConfig {
            trigger_miss_limit: 1,
            ..instant_config()
        });

        Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(session.scrolls(), vec![0.7, 1.0]);
    }

    #[tokio::test]
    async fn test_probe_positions_are_tried_when_control_is_missing() {
        let session = FakeSession::new(vec![page(&["A"], false)]);
        let plan = plan(HarvestConfig {
            trigger_miss_limit: 1,
            probe_fractions: vec![0.9, 0.5],
            ..instant_config()
        });

        Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(session.scrolls(), vec![0.7, 1.0, 0.9, 0.5]);
    }

    #[tokio::test]
    async fn test_collapsed_page_is_scrolled_back_down() {
        let session = FakeSession::new(vec![
            page(&["A", "B", "C", "D", "E", "F", "G", "H"], true),
            page(&["A"], false),
        ]);
        let plan = plan(HarvestConfig {
            trigger_miss_limit: 1,
            scroll_oscillations: 0,
            ..instant_config()
        });

        Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(session.scrolls(), vec![0.7, 1.0, 1.0, 0.7, 1.0]);
    }

    #[tokio::test]
    async fn test_growing_page_is_not_rescrolled() {
        let session = FakeSession::new(vec![page(&["A"], true), page(&["A", "B"], false)]);
        let plan = plan(HarvestConfig {
            trigger_miss_limit: 1,
            scroll_oscillations: 0,
            ..instant_config()
        });

        Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(session.scrolls(), vec![0.7, 1.0, 0.7, 1.0]);
    }

    #[tokio::test]
    async fn test_settle_oscillates_around_the_bottom() {
        let session = FakeSession::new(vec![page(&["A"], true), page(&["A", "B"], false)]);
        let plan = plan(HarvestConfig {
            trigger_miss_limit: 1,
            ..instant_config()
        });

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(
            session.scrolls(),
            vec![
                0.7, 1.0, // round 1
                1.0, 0.9, 1.0, 1.0, 0.9, 1.0, 1.0, 0.9, 1.0, // settle
                0.7, 1.0, // round 2
            ]
        );
        assert_eq!(titles(&report.items), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_zero_yield_retry_picks_up_late_rows() {
        // Source calls: round 1 parse, round 2 parse, round 2 retry.
        let session = FakeSession::new(vec![page(&[], true), page(&["A", "B"], true)])
            .replaced_source_call(2, page(&["A", "B", "C"], true));
        let plan = plan(HarvestConfig {
            max_rounds: 2,
            scroll_oscillations: 0,
            ..instant_config()
        });

        let report = Harvester::new(&session, &plan).run().await.unwrap();

        assert_eq!(report.stop, StopReason::RoundBudget);
        assert_eq!(titles(&report.items), vec!["A", "B", "C"]);
        assert_eq!(
            report.rounds[1].outcome,
            RoundOutcome::Progressed { parsed: 3, added: 1 }
        );
        assert_eq!(session.scrolls(), vec![0.7, 1.0, 0.7, 1.0, 0.5, 1.0]);
    }
}
