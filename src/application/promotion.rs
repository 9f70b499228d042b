//! Promotion engine
//!
//! Converts unprocessed staged rows into the normalized catalog: supermarket,
//! brand, product, raw-data provenance, price, and discounts, resolved or
//! inserted against in-memory dedup maps loaded once per run. A row that
//! fails stays unprocessed and is retried on the next run; the run itself
//! continues with the remaining rows. Re-running over already promoted state
//! inserts nothing.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::domain::discount::{DiscountType, StagedDiscount};
use crate::domain::entities::RawProductData;
use crate::domain::numeric::normalize_word;
use crate::domain::product::StagedProduct;
use crate::infrastructure::catalog_repository::{CatalogRepository, DedupMaps};
use crate::infrastructure::staging_repository::{StagingRepository, StoreResult};

/// Normalized terms of one staged discount: the effective per-unit price and
/// how many units the rule spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountTerms {
    pub unit_value: i64,
    pub min_qty: Option<i64>,
    pub multiple_qty: i64,
}

/// Per-kind unit-value rules.
///
/// - Wholesale and card prices are flat per-unit prices; the conditions text
///   is informational.
/// - Buy-X-get-Y means paying for `buy` units and taking `buy + get`, so the
///   effective unit value is `discounted_price * buy / (buy + get)` (integer
///   division) over a span of `buy + get` units. Rows missing either
///   quantity carry no computable terms.
/// - Percentage-from-quantity keeps the discounted price as the unit value,
///   applying from the minimum quantity (1 when the source omitted it).
pub struct DiscountRules;

impl DiscountRules {
    pub fn evaluate(discount: &StagedDiscount) -> Option<DiscountTerms> {
        match discount.discount_type {
            DiscountType::Wholesale | DiscountType::Card => Some(DiscountTerms {
                unit_value: discount.discounted_price,
                min_qty: discount.conditions_min_quantity,
                multiple_qty: 1,
            }),
            DiscountType::BuyXGetY => {
                let buy = discount.conditions_buy_quantity.filter(|&q| q > 0)?;
                let get = discount.conditions_get_quantity.filter(|&q| q >= 0)?;
                Some(DiscountTerms {
                    unit_value: discount.discounted_price * buy / (buy + get),
                    min_qty: discount.conditions_min_quantity,
                    multiple_qty: buy + get,
                })
            }
            DiscountType::PercentageQuantity => Some(DiscountTerms {
                unit_value: discount.discounted_price,
                min_qty: discount.conditions_min_quantity,
                multiple_qty: discount.conditions_min_quantity.unwrap_or(1),
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct PromotionSummary {
    pub rows_seen: usize,
    pub rows_promoted: usize,
    pub rows_failed: usize,
    pub prices_inserted: usize,
    pub prices_already_recorded: usize,
    pub discounts_inserted: usize,
}

#[derive(Debug, Default)]
struct RowOutcome {
    price_inserted: bool,
    discounts_inserted: usize,
}

pub struct PromotionEngine {
    staging: StagingRepository,
    catalog: CatalogRepository,
    /// Max rows per run; 0 means no limit.
    batch_limit: u32,
}

impl PromotionEngine {
    pub fn new(staging: StagingRepository, catalog: CatalogRepository, batch_limit: u32) -> Self {
        Self {
            staging,
            catalog,
            batch_limit,
        }
    }

    pub async fn run(&self, market: Option<&str>) -> Result<PromotionSummary> {
        let mut maps = self.catalog.load_dedup_maps().await?;
        let staged = self.staging.fetch_unprocessed(market, self.batch_limit).await?;
        info!(rows = staged.len(), "starting promotion run");

        let mut discounts_by_product: HashMap<i64, Vec<StagedDiscount>> = HashMap::new();
        for discount in self.staging.fetch_staged_discounts().await? {
            discounts_by_product
                .entry(discount.product_id)
                .or_default()
                .push(discount);
        }

        let mut summary = PromotionSummary::default();
        for row in staged {
            summary.rows_seen += 1;
            match self.promote_row(&row, &discounts_by_product, &mut maps).await {
                Ok(outcome) => {
                    summary.rows_promoted += 1;
                    if outcome.price_inserted {
                        summary.prices_inserted += 1;
                    } else {
                        summary.prices_already_recorded += 1;
                    }
                    summary.discounts_inserted += outcome.discounts_inserted;
                }
                // The row stays unprocessed and is retried next run.
                Err(e) => {
                    warn!(staged_id = row.id, name = %row.name, "row promotion failed: {e}");
                    summary.rows_failed += 1;
                }
            }
        }

        info!(
            promoted = summary.rows_promoted,
            failed = summary.rows_failed,
            prices = summary.prices_inserted,
            already_recorded = summary.prices_already_recorded,
            discounts = summary.discounts_inserted,
            "promotion run finished"
        );
        Ok(summary)
    }

    async fn promote_row(
        &self,
        row: &StagedProduct,
        discounts_by_product: &HashMap<i64, Vec<StagedDiscount>>,
        maps: &mut DedupMaps,
    ) -> StoreResult<RowOutcome> {
        let market = normalize_word(&row.market);
        let id_supermarket = match maps.supermarkets.get(&market) {
            Some(&id) => id,
            None => {
                let id = self.catalog.insert_supermarket(&market).await?;
                info!(supermarket = %market, id, "supermarket inserted");
                maps.supermarkets.insert(market.clone(), id);
                id
            }
        };

        let id_brand = match row.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(brand) => {
                let normalized_brand = normalize_word(brand);
                match maps.brands.get(&normalized_brand) {
                    Some(&id) => Some(id),
                    None => {
                        let id = self.catalog.insert_brand(brand, &normalized_brand).await?;
                        info!(brand, id, "brand inserted");
                        maps.brands.insert(normalized_brand, id);
                        Some(id)
                    }
                }
            }
            None => None,
        };

        let normalized_name = normalize_word(&row.name);
        let id_product = match maps.products.get(&normalized_name) {
            Some(&id) => id,
            None => {
                let id = self
                    .catalog
                    .insert_product(&row.name, &normalized_name, row.quantity, id_brand)
                    .await?;
                info!(product = %row.name, id, "product inserted");
                maps.products.insert(normalized_name, id);
                id
            }
        };

        if let Some(url) = row.product_url.as_deref().filter(|u| !u.is_empty()) {
            if !maps.raw_product_urls.contains_key(url) {
                self.catalog
                    .insert_raw_product_data(&RawProductData {
                        product_id: id_product,
                        original_name: row.name.clone(),
                        product_url: url.to_string(),
                        extraction_date: row.extraction_date,
                        market: market.clone(),
                    })
                    .await?;
                maps.raw_product_urls.insert(url.to_string(), id_product);
            }
        }

        let mut outcome = RowOutcome::default();
        let price_key = (id_supermarket, id_product, row.extraction_date);
        if maps.price_keys.contains(&price_key) {
            // Same product seen under another category in the same run.
            debug!(
                id_supermarket,
                id_product,
                extraction_date = %row.extraction_date,
                "price already recorded"
            );
        } else {
            let id_price = self
                .catalog
                .insert_price(
                    id_supermarket,
                    id_product,
                    row.extraction_date,
                    row.price,
                    row.currency.as_deref(),
                )
                .await?;
            maps.price_keys.insert(price_key);
            outcome.price_inserted = true;

            if let Some(discounts) = discounts_by_product.get(&row.id) {
                for discount in discounts {
                    let Some(terms) = DiscountRules::evaluate(discount) else {
                        warn!(
                            staged_id = row.id,
                            kind = discount.discount_type.as_str(),
                            "discount has no computable terms, skipping"
                        );
                        continue;
                    };
                    self.catalog
                        .insert_discount(
                            id_price,
                            terms.unit_value,
                            discount.discount_type.as_str(),
                            terms.min_qty,
                            terms.multiple_qty,
                        )
                        .await?;
                    outcome.discounts_inserted += 1;
                }
            }
        }

        // Unconditional: a skipped price still means the row is accounted for.
        self.staging.mark_processed(row.id).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wholesale_and_card_are_flat_per_unit_prices() {
        let wholesale = StagedDiscount::wholesale(2199, 10, None);
        assert_eq!(
            DiscountRules::evaluate(&wholesale),
            Some(DiscountTerms {
                unit_value: 2199,
                min_qty: Some(10),
                multiple_qty: 1,
            })
        );

        let card = StagedDiscount::card(2199, Some("com cartão".to_string()));
        assert_eq!(
            DiscountRules::evaluate(&card),
            Some(DiscountTerms {
                unit_value: 2199,
                min_qty: None,
                multiple_qty: 1,
            })
        );
    }

    #[test]
    fn buy_x_get_y_spreads_the_paid_price_over_the_span() {
        // Pay for 2, take 3: 900 * 2 / 3 = 600 per unit.
        let discount = StagedDiscount::buy_x_get_y(900, 2, 1, None);
        assert_eq!(
            DiscountRules::evaluate(&discount),
            Some(DiscountTerms {
                unit_value: 600,
                min_qty: None,
                multiple_qty: 3,
            })
        );
    }

    #[test]
    fn buy_x_get_y_without_quantities_has_no_terms() {
        let mut discount = StagedDiscount::buy_x_get_y(900, 2, 1, None);
        discount.conditions_get_quantity = None;
        assert_eq!(DiscountRules::evaluate(&discount), None);

        let mut discount = StagedDiscount::buy_x_get_y(900, 2, 1, None);
        discount.conditions_buy_quantity = Some(0);
        assert_eq!(DiscountRules::evaluate(&discount), None);
    }

    #[test]
    fn percentage_quantity_applies_from_the_minimum() {
        let discount = StagedDiscount::percentage_quantity(450, 6, None);
        assert_eq!(
            DiscountRules::evaluate(&discount),
            Some(DiscountTerms {
                unit_value: 450,
                min_qty: Some(6),
                multiple_qty: 6,
            })
        );
    }
}
