//! # ru_news_harvest
//!
//! Harvests publication dates and headlines from Russian financial news
//! feeds and writes one deduplicated CSV file per site.
//!
//! ## Features
//!
//! - Drives infinite-scroll feeds (Finam, Interfax, Vedomosti) in Chromium,
//!   clicking "load more" and re-parsing the whole page every round so items
//!   evicted by feed virtualization are not lost
//! - Follows "next page" links on server-rendered feeds (AKM) over plain HTTP
//! - Deduplicates by `(date, title)`, keeping first-seen order
//! - Per-site tunables overridable from a YAML settings file
//!
//! ## Usage
//!
//! ```sh
//! ru_news_harvest interfax akm -o ./csv
//! ```
//!
//! ## Architecture
//!
//! 1. **Planning**: Build each requested site's profile and apply settings
//! 2. **Harvesting**: Run the interactive harvester or the paginator
//! 3. **Output**: Write `<site>.csv` into the output directory
//!
//! Sites run one after another. A failing site is logged and skipped.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod accumulator;
mod browser;
mod cli;
mod config;
mod dates;
mod extract;
mod harvest;
mod locator;
mod models;
mod outputs;
mod paginate;
mod scrapers;
mod utils;

use cli::Cli;
use config::Settings;
use harvest::HarvestPlan;
use models::NewsItem;
use outputs::csv;
use paginate::{HttpFetcher, paginate};
use scrapers::{Site, SiteProfile};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ru_news_harvest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let settings = match &args.config {
        Some(path) => Settings::load(path).await.inspect_err(|e| {
            error!(path = %path, error = %e, "Settings file could not be loaded");
        })?,
        None => Settings::default(),
    };

    // Early check: a bad output dir should fail before minutes of scrolling.
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // Apply settings to every profile up front so a typo fails the run immediately.
    let mut profiles = Vec::new();
    for site in args.selected_sites() {
        let mut profile = site.profile();
        if let Err(e) = settings.apply(site, &mut profile) {
            error!(%site, error = %e, "Invalid settings");
            return Err(e);
        }
        profiles.push((site, profile));
    }
    info!(sites = ?profiles.iter().map(|(s, _)| s.name()).collect::<Vec<_>>(), "Harvest plan ready");

    let mut written = 0;
    let mut failed = 0;
    for (site, profile) in profiles {
        let items = match run_site(site, profile, args.headed).await {
            Ok(items) => items,
            Err(e) => {
                error!(%site, error = %e, "Site harvest failed; moving on");
                failed += 1;
                continue;
            }
        };

        let path = Path::new(&args.output_dir).join(site.output_file());
        match csv::write_items(&path, &items).await {
            Ok(true) => written += 1,
            Ok(false) => warn!(%site, "Nothing harvested"),
            Err(e) => {
                error!(%site, path = %path.display(), error = %e, "Failed to write results");
                failed += 1;
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        written,
        failed,
        "Execution complete"
    );

    Ok(())
}

/// Harvest one site with whichever driver its profile calls for.
#[instrument(level = "info", skip(profile))]
async fn run_site(
    site: Site,
    profile: SiteProfile,
    headed: bool,
) -> Result<Vec<NewsItem>, Box<dyn Error>> {
    match profile {
        SiteProfile::Interactive(plan) => harvest_interactive(&plan, headed).await,
        SiteProfile::Paged(plan) => {
            let fetcher = HttpFetcher::new(Duration::from_millis(plan.config.request_timeout_ms))?;
            let report = paginate(&fetcher, &plan).await;
            info!(pages = report.pages, stop = ?report.stop, count = report.items.len(), "Pagination done");
            Ok(report.items)
        }
    }
}

/// Launch Chromium, harvest, and close the browser whatever the outcome.
#[cfg(feature = "browser")]
async fn harvest_interactive(plan: &HarvestPlan, headed: bool) -> Result<Vec<NewsItem>, Box<dyn Error>> {
    use browser::chrome::ChromeSession;
    use harvest::Harvester;

    let session = ChromeSession::launch(!headed).await?;
    let result = Harvester::new(&session, plan).run().await;
    session.shutdown().await;

    let report = result?;
    info!(
        rounds = report.rounds.len(),
        stop = ?report.stop,
        count = report.items.len(),
        "Harvest done"
    );
    Ok(report.items)
}

#[cfg(not(feature = "browser"))]
async fn harvest_interactive(plan: &HarvestPlan, _headed: bool) -> Result<Vec<NewsItem>, Box<dyn Error>> {
    warn!(site = plan.site, "Built without the `browser` feature");
    Err(browser::SessionError::Unsupported.into())
}
