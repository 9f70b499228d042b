//! JSON file export
//!
//! Writes the scraped batch for one market to disk alongside the staging
//! insert, as a single-line JSON array of the products' document form. The
//! filename embeds the market and the run's extraction timestamp (ISO-8601,
//! seconds precision, colons replaced by dashes so it stays portable across
//! filesystems), so one run produces one file per market.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::domain::product::StagedProduct;

/// Write `products` to `<export_dir>/<market>_products_<timestamp>.json`.
/// Creates the directory if missing and returns the written path.
pub async fn export_products(
    export_dir: &Path,
    market: &str,
    extraction_date: DateTime<Utc>,
    products: &[StagedProduct],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(export_dir)
        .await
        .with_context(|| format!("creating export directory {}", export_dir.display()))?;

    let timestamp = extraction_date
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace(':', "-");
    // Market name goes in verbatim: `Tenda_products_...`.
    let filename = format!("{market}_products_{timestamp}.json");
    let path = export_dir.join(filename);

    let documents: Vec<serde_json::Value> = products.iter().map(|p| p.to_document()).collect();
    let body = serde_json::to_string(&documents).context("serializing product export")?;

    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("writing export file {}", path.display()))?;

    info!(count = products.len(), path = %path.display(), "products exported");
    Ok(path)
}
