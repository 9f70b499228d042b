//! Market extraction contract
//!
//! Each market implements category listing and single-page fetching; the
//! trait provides the page-by-page traversal shared by every source: URL
//! dedup within a category run, termination on exhausted or stale pages,
//! and a totals check against the source's own count when it publishes one.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::product::StagedProduct;

/// Listing pages never legitimately run this deep; a source that keeps
/// returning product pages past this point is serving duplicates.
const MAX_PAGES_PER_CATEGORY: u32 = 500;

/// One navigable category of a market. JSON-API sources carry an `id`,
/// HTML sources a listing `url`; each extractor uses the field it needs.
#[derive(Debug, Clone)]
pub struct Category {
    pub id: Option<String>,
    pub name: String,
    pub url: Option<String>,
}

/// One fetched listing page. Sources that publish totals fill them in on
/// the first page; the traversal falls back to staleness detection when
/// they stay `None`.
#[derive(Debug, Default)]
pub struct ProductPage {
    pub products: Vec<StagedProduct>,
    pub total_pages: Option<u32>,
    pub total_products: Option<usize>,
}

#[async_trait]
pub trait MarketExtractor: Send + Sync {
    /// Display name of the market, as stored on every staged row.
    fn market(&self) -> &str;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Fetch and parse one listing page. Pages start at 1.
    async fn fetch_page(&self, category: &Category, page: u32) -> Result<ProductPage>;

    /// Traverse every page of a category, deduplicating by product URL.
    ///
    /// Terminates on: an empty page, a page contributing no product not
    /// already seen, the source-declared page total, or the hard page cap.
    /// A fetch failure on the first page aborts the category; later pages
    /// are skipped with a warning when the page total is known, otherwise
    /// the traversal stops there.
    async fn list_products(&self, category: &Category) -> Result<Vec<StagedProduct>> {
        let mut all_products = Vec::new();
        let mut seen_keys: HashSet<String> = HashSet::new();
        let mut expected_pages: Option<u32> = None;
        let mut expected_products: Option<usize> = None;

        let mut page = 1;
        loop {
            if page > MAX_PAGES_PER_CATEGORY {
                warn!(
                    market = self.market(),
                    category = %category.name,
                    page,
                    "page cap reached, stopping traversal"
                );
                break;
            }

            let fetched = match self.fetch_page(category, page).await {
                Ok(fetched) => fetched,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(
                        market = self.market(),
                        category = %category.name,
                        page,
                        "page fetch failed: {e:#}"
                    );
                    match expected_pages {
                        // More pages are known to exist; skip this one.
                        Some(total) if page < total => {
                            page += 1;
                            continue;
                        }
                        _ => break,
                    }
                }
            };

            if page == 1 {
                expected_pages = fetched.total_pages;
                expected_products = fetched.total_products;
                if expected_products == Some(0) {
                    warn!(
                        market = self.market(),
                        category = %category.name,
                        "category reports zero products"
                    );
                    break;
                }
            }

            if fetched.products.is_empty() {
                debug!(
                    market = self.market(),
                    category = %category.name,
                    page,
                    "empty page, stopping traversal"
                );
                break;
            }

            let mut added = 0usize;
            for product in fetched.products {
                if seen_keys.insert(dedup_key(&product)) {
                    all_products.push(product);
                    added += 1;
                }
            }

            info!(
                market = self.market(),
                category = %category.name,
                page,
                added,
                total = all_products.len(),
                "category page processed"
            );

            if added == 0 {
                debug!(
                    market = self.market(),
                    category = %category.name,
                    page,
                    "no new products on page, stopping traversal"
                );
                break;
            }

            match expected_pages {
                Some(total) if page >= total => break,
                _ => page += 1,
            }
        }

        match expected_products {
            Some(expected) if all_products.len() != expected => warn!(
                market = self.market(),
                category = %category.name,
                actual = all_products.len(),
                expected,
                "product count differs from the source's declared total"
            ),
            _ => info!(
                market = self.market(),
                category = %category.name,
                count = all_products.len(),
                "category finished"
            ),
        }

        Ok(all_products)
    }
}

/// Dedup identity of a product within one category run: the product URL
/// when present, otherwise the source id, otherwise the name.
fn dedup_key(product: &StagedProduct) -> String {
    product
        .product_url
        .clone()
        .or_else(|| product.source_id.clone())
        .unwrap_or_else(|| product.name.clone())
}
