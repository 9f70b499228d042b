//! Scrape run driver
//!
//! Walks one market's categories sequentially. Each extracted batch is
//! handed to a background staging write while the next category is fetched;
//! the full run is exported to one JSON file per market. Every write handle
//! is joined before the run returns, so a partially failed run still
//! persists everything that succeeded. One category failing never aborts
//! its siblings; the run as a whole fails only when every category did.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::application::extractor::MarketExtractor;
use crate::infrastructure::file_export;
use crate::infrastructure::staging_repository::StagingRepository;

#[derive(Debug)]
pub struct RunSummary {
    pub market: String,
    pub categories_total: usize,
    pub categories_ok: usize,
    pub categories_failed: usize,
    pub products_staged: usize,
    pub elapsed: Duration,
}

pub struct ScrapeRunner {
    staging: StagingRepository,
    export_dir: PathBuf,
}

impl ScrapeRunner {
    pub fn new(staging: StagingRepository, export_dir: PathBuf) -> Self {
        Self {
            staging,
            export_dir,
        }
    }

    pub async fn run(&self, extractor: &dyn MarketExtractor) -> Result<RunSummary> {
        let started = Instant::now();
        let market = extractor.market().to_string();
        info!(market = %market, "starting scrape run");

        let categories = extractor.list_categories().await?;
        let total = categories.len();

        let mut ok = 0usize;
        let mut failed = 0usize;
        let mut staged = 0usize;
        let mut all_products = Vec::new();
        let mut write_handles = Vec::new();

        for (idx, category) in categories.iter().enumerate() {
            info!(
                market = %market,
                category = %category.name,
                progress = %format!("{}/{}", idx + 1, total),
                "processing category"
            );

            let products = match extractor.list_products(category).await {
                Ok(products) => products,
                Err(e) => {
                    warn!(
                        market = %market,
                        category = %category.name,
                        "category extraction failed: {e:#}"
                    );
                    failed += 1;
                    continue;
                }
            };

            ok += 1;
            if products.is_empty() {
                continue;
            }
            staged += products.len();
            all_products.extend(products.iter().cloned());

            let handle = self.staging.insert_products_with_discounts_async(
                products,
                category.name.clone(),
                |success, count, label| {
                    if success {
                        info!(count, category = label, "staged batch inserted");
                    } else {
                        error!(count, category = label, "staged batch insertion failed");
                    }
                },
            );
            write_handles.push((category.name.clone(), handle));
        }

        // One export file per market per run, named by the extraction date.
        if let Some(extraction_date) = all_products.first().map(|p| p.extraction_date) {
            if let Err(e) = file_export::export_products(
                &self.export_dir,
                &market,
                extraction_date,
                &all_products,
            )
            .await
            {
                warn!(market = %market, "file export failed: {e:#}");
            }
        }

        info!(market = %market, pending = write_handles.len(), "waiting for staging writes");
        let (labels, handles): (Vec<_>, Vec<_>) = write_handles.into_iter().unzip();
        for (label, joined) in labels.into_iter().zip(join_all(handles).await) {
            // A panicked task or a reported write failure both fail the
            // category after the fact.
            if !joined.unwrap_or(false) {
                failed += 1;
                ok = ok.saturating_sub(1);
                warn!(market = %market, category = %label, "staging write did not complete");
            }
        }

        let summary = RunSummary {
            market: market.clone(),
            categories_total: total,
            categories_ok: ok,
            categories_failed: failed,
            products_staged: staged,
            elapsed: started.elapsed(),
        };

        info!(
            market = %market,
            categories_ok = summary.categories_ok,
            categories_failed = summary.categories_failed,
            products_staged = summary.products_staged,
            elapsed_secs = summary.elapsed.as_secs(),
            "scrape run finished"
        );

        if total > 0 && summary.categories_ok == 0 {
            bail!("every category of market '{market}' failed");
        }
        Ok(summary)
    }
}
