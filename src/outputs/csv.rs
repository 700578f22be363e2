//! CSV output for harvested items.
//!
//! Files are UTF-8 with a byte-order mark so spreadsheet tools detect the
//! encoding of Cyrillic headlines, followed by a `date,title` header and one
//! row per item. Existing files are overwritten.

use crate::models::NewsItem;
use crate::utils::truncate_for_log;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info, instrument};

const BOM: &str = "\u{feff}";

/// Render `items` as BOM-prefixed CSV bytes.
fn render(items: &[NewsItem]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut writer = ::csv::Writer::from_writer(BOM.as_bytes().to_vec());
    for item in items {
        writer.serialize(item)?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// Write `items` to `path`.
///
/// # Arguments
///
/// * `path` - Destination file; replaced if it exists
/// * `items` - Items in output order
///
/// # Returns
///
/// `Ok(true)` when the file was written, `Ok(false)` when `items` was empty
/// and nothing was touched, or an error if serialization or the write failed.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_items(path: &Path, items: &[NewsItem]) -> Result<bool, Box<dyn Error>> {
    if items.is_empty() {
        info!("No items to save; leaving output untouched");
        return Ok(false);
    }

    let bytes = render(items)?;
    if let Some(first) = items.first() {
        debug!(first = %truncate_for_log(&first.title, 80), "First row");
    }
    if let Err(e) = fs::write(path, bytes).await {
        error!(error = %e, "Failed writing CSV");
        return Err(e.into());
    }
    info!(count = items.len(), "Wrote CSV");
    Ok(true)
}
