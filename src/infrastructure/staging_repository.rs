//! Staging store repository
//!
//! Bulk persistence of staged products and their discounts. The combined
//! write is two-phase: all products in one transaction first, then — only if
//! that committed — every discount across the batch in a second transaction.
//! A failed phase rolls back entirely; discounts are never attempted after a
//! failed product phase.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::domain::discount::{DiscountType, StagedDiscount};
use crate::domain::product::StagedProduct;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("write failed: {0}")]
    Write(#[source] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
pub struct StagingRepository {
    pool: Arc<SqlitePool>,
}

impl StagingRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Insert a batch of staged products as one all-or-nothing transaction.
    pub async fn insert_products(&self, products: &[StagedProduct]) -> StoreResult<()> {
        if products.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::Connection)?;

        for product in products {
            let (
                id,
                name,
                market,
                category,
                brand,
                product_url,
                source_id,
                price,
                quantity,
                unit_of_measure,
                extraction_url,
                extraction_date,
                currency,
            ) = product.to_tuple();

            sqlx::query(
                r#"
                INSERT INTO stage_scraping_products (
                    id, name, market, category, brand, product_url, source_id,
                    price, quantity, unit_of_measure, extraction_url,
                    extraction_date, currency
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(market)
            .bind(category)
            .bind(brand)
            .bind(product_url)
            .bind(source_id)
            .bind(price)
            .bind(quantity.map(|q| q.to_string()))
            .bind(unit_of_measure)
            .bind(extraction_url)
            .bind(extraction_date)
            .bind(currency)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?;
        }

        tx.commit().await.map_err(StoreError::Write)?;
        debug!(count = products.len(), "staged products inserted");
        Ok(())
    }

    /// Insert a batch of staged discounts as one all-or-nothing transaction.
    pub async fn insert_discounts(&self, discounts: &[StagedDiscount]) -> StoreResult<()> {
        if discounts.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::Connection)?;

        for discount in discounts {
            let (
                product_id,
                discount_type,
                discounted_price,
                conditions_text,
                min_quantity,
                buy_quantity,
                get_quantity,
            ) = discount.to_tuple();

            sqlx::query(
                r#"
                INSERT INTO stage_discounts (
                    product_id, type, discounted_price, conditions_text,
                    conditions_min_quantity, conditions_buy_quantity,
                    conditions_get_quantity
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(product_id)
            .bind(discount_type)
            .bind(discounted_price)
            .bind(conditions_text)
            .bind(min_quantity)
            .bind(buy_quantity)
            .bind(get_quantity)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Write)?;
        }

        tx.commit().await.map_err(StoreError::Write)?;
        debug!(count = discounts.len(), "staged discounts inserted");
        Ok(())
    }

    /// Two-phase batch write: products first, then every discount collected
    /// from the batch. If the product phase fails, no discount statement is
    /// attempted and the error is reported.
    pub async fn insert_products_with_discounts(
        &self,
        products: &[StagedProduct],
    ) -> StoreResult<()> {
        debug!(count = products.len(), "starting product batch insertion");
        self.insert_products(products).await?;

        let discounts: Vec<StagedDiscount> = products
            .iter()
            .flat_map(|p| p.discounts.iter().cloned())
            .collect();

        if discounts.is_empty() {
            debug!("no discounts to insert");
            return Ok(());
        }

        self.insert_discounts(&discounts).await
    }

    /// Submit a two-phase write to a background task and return immediately.
    ///
    /// On completion the callback receives (success, item count, batch
    /// label). The handle resolves to the success flag; the driver must join
    /// every outstanding handle before process exit. Batches submitted
    /// concurrently carry no ordering guarantee; each is independently
    /// atomic per phase.
    pub fn insert_products_with_discounts_async<F>(
        &self,
        products: Vec<StagedProduct>,
        label: String,
        callback: F,
    ) -> JoinHandle<bool>
    where
        F: FnOnce(bool, usize, &str) + Send + 'static,
    {
        let repository = self.clone();
        tokio::spawn(async move {
            let count = products.len();
            debug!(count, label = %label, "starting async batch insertion");

            let success = match repository.insert_products_with_discounts(&products).await {
                Ok(()) => true,
                Err(e) => {
                    error!(label = %label, count, "async batch insertion failed: {e}");
                    false
                }
            };

            callback(success, count, &label);
            success
        })
    }

    /// Staged rows not yet promoted, oldest source first. `market` narrows
    /// to one source; `limit` of zero means no limit.
    pub async fn fetch_unprocessed(
        &self,
        market: Option<&str>,
        limit: u32,
    ) -> StoreResult<Vec<StagedProduct>> {
        let mut sql = String::from(
            r#"
            SELECT id, name, market, category, brand, product_url, source_id,
                   price, quantity, unit_of_measure, extraction_url,
                   extraction_date, currency, created_at
            FROM stage_scraping_products
            WHERE is_processed = 0
            "#,
        );
        if market.is_some() {
            sql.push_str(" AND market = ?");
        }
        sql.push_str(" ORDER BY id ASC");
        if limit > 0 {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(market) = market {
            query = query.bind(market);
        }
        if limit > 0 {
            query = query.bind(i64::from(limit));
        }

        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(StoreError::Query)?;

        rows.into_iter().map(|row| map_product_row(&row)).collect()
    }

    /// All staged discounts, for joining against unprocessed rows during a
    /// promotion run.
    pub async fn fetch_staged_discounts(&self) -> StoreResult<Vec<StagedDiscount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, type, discounted_price, conditions_text,
                   conditions_min_quantity, conditions_buy_quantity,
                   conditions_get_quantity, created_at
            FROM stage_discounts
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(StoreError::Query)?;

        rows.into_iter().map(|row| map_discount_row(&row)).collect()
    }

    /// Flip the processed flag on a staged row. Idempotent.
    pub async fn mark_processed(&self, id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE stage_scraping_products SET is_processed = 1 WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::Write)?;
        Ok(())
    }
}

fn map_product_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<StagedProduct> {
    let quantity: Option<String> = row.try_get("quantity").map_err(StoreError::Query)?;
    let quantity = quantity
        .as_deref()
        .map(Decimal::from_str)
        .transpose()
        .map_err(|e| StoreError::Query(sqlx::Error::Decode(Box::new(e))))?;

    let created_at: Option<chrono::NaiveDateTime> =
        row.try_get("created_at").map_err(StoreError::Query)?;

    Ok(StagedProduct {
        id: row.try_get("id").map_err(StoreError::Query)?,
        name: row.try_get("name").map_err(StoreError::Query)?,
        market: row.try_get("market").map_err(StoreError::Query)?,
        price: row.try_get("price").map_err(StoreError::Query)?,
        extraction_date: row
            .try_get::<DateTime<Utc>, _>("extraction_date")
            .map_err(StoreError::Query)?,
        category: row.try_get("category").map_err(StoreError::Query)?,
        brand: row.try_get("brand").map_err(StoreError::Query)?,
        product_url: row.try_get("product_url").map_err(StoreError::Query)?,
        source_id: row.try_get("source_id").map_err(StoreError::Query)?,
        quantity,
        unit_of_measure: row.try_get("unit_of_measure").map_err(StoreError::Query)?,
        extraction_url: row.try_get("extraction_url").map_err(StoreError::Query)?,
        currency: row.try_get("currency").map_err(StoreError::Query)?,
        discounts: Vec::new(),
        created_at: created_at.map(|naive| Utc.from_utc_datetime(&naive)),
    })
}

fn map_discount_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<StagedDiscount> {
    let type_text: String = row.try_get("type").map_err(StoreError::Query)?;
    let discount_type = DiscountType::parse(&type_text).ok_or_else(|| {
        StoreError::Query(sqlx::Error::Decode(
            format!("unknown discount type '{type_text}'").into(),
        ))
    })?;

    let created_at: Option<chrono::NaiveDateTime> =
        row.try_get("created_at").map_err(StoreError::Query)?;

    Ok(StagedDiscount {
        product_id: row.try_get("product_id").map_err(StoreError::Query)?,
        discount_type,
        discounted_price: row.try_get("discounted_price").map_err(StoreError::Query)?,
        conditions_text: row.try_get("conditions_text").map_err(StoreError::Query)?,
        conditions_min_quantity: row
            .try_get("conditions_min_quantity")
            .map_err(StoreError::Query)?,
        conditions_buy_quantity: row
            .try_get("conditions_buy_quantity")
            .map_err(StoreError::Query)?,
        conditions_get_quantity: row
            .try_get("conditions_get_quantity")
            .map_err(StoreError::Query)?,
        id: row.try_get("id").map_err(StoreError::Query)?,
        created_at: created_at.map(|naive| Utc.from_utc_datetime(&naive)),
    })
}
