//! Command-line interface definitions for the harvester.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Paths can also be provided through environment variables.

use crate::scrapers::Site;
use clap::Parser;

/// Command-line arguments for `ru_news_harvest`.
///
/// # Examples
///
/// ```sh
/// # Harvest every site into the current directory
/// ru_news_harvest
///
/// # Two sites, custom output directory and settings
/// ru_news_harvest interfax akm -o ./csv -c ./settings.yaml
///
/// # Watch the browser while it works
/// ru_news_harvest vedomosti-business --headed
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Sites to harvest, in order (default: all)
    #[arg(value_enum)]
    pub sites: Vec<Site>,

    /// Directory the CSV files are written to
    #[arg(short, long, env = "NEWS_HARVEST_OUTPUT_DIR", default_value = ".")]
    pub output_dir: String,

    /// Optional path to a YAML settings file overriding per-site tunables
    #[arg(short, long, env = "NEWS_HARVEST_CONFIG")]
    pub config: Option<String>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,
}

impl Cli {
    /// Requested sites, or every site when none were named. Repeats are dropped.
    pub fn selected_sites(&self) -> Vec<Site> {
        if self.sites.is_empty() {
            return Site::ALL.to_vec();
        }
        let mut selected = Vec::new();
        for site in &self.sites {
            if !selected.contains(site) {
                selected.push(*site);
            }
        }
        selected
    }
}
