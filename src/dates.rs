//! Date normalization for scraped publication dates.
//!
//! Sites publish dates as ISO date-times in `datetime` attributes, as
//! `DD.MM.YYYY` text, as a token embedded in the article URL, or as free
//! Russian text. Everything recognizable is rewritten to `YYYY-MM-DD` or
//! `YYYY-MM-DD HH:MM`; everything else passes through untouched.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());
static DOT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{2})\.(\d{2})\.(\d{4})$").unwrap());
static URL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-([0-9]{8})-([0-9]{4})(?:/|$)").unwrap());

/// How much of an ISO date-time to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePrecision {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DD HH:MM`
    Minute,
}

/// Rewrite `raw` to its canonical form, or `None` when the format is unknown.
///
/// Extractors that must drop items without a usable date call this instead
/// of [`normalize`].
pub fn recognize(raw: &str, precision: DatePrecision) -> Option<String> {
    let s = raw.trim();
    if ISO_PREFIX.is_match(s) {
        let canonical = match precision {
            DatePrecision::Day => s.chars().take(10).collect(),
            DatePrecision::Minute => s.replace('T', " ").chars().take(16).collect(),
        };
        return Some(canonical);
    }

    DOT_DATE
        .captures(s)
        .map(|caps| format!("{}-{}-{}", &caps[3], &caps[2], &caps[1]))
}

/// Total normalization: unknown formats come back unchanged.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize("05.02.2026", DatePrecision::Day), "2026-02-05");
/// assert_eq!(normalize("not a date", DatePrecision::Day), "not a date");
/// ```
pub fn normalize(raw: &str, precision: DatePrecision) -> String {
    recognize(raw, precision).unwrap_or_else(|| raw.to_string())
}

/// Parse the `-YYYYMMDD-HHMM` token finam embeds in article URLs.
///
/// Returns `YYYY-MM-DD HH:MM`, or an empty string when the token is absent or
/// is not a real calendar date-time.
pub fn date_from_url(url: &str) -> String {
    let Some(caps) = URL_TOKEN.captures(url) else {
        return String::new();
    };
    let stamp = format!("{}{}", &caps[1], &caps[2]);
    NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M")
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}
