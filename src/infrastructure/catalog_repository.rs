//! Catalog repository
//!
//! Reads and writes the normalized tables the promotion pass targets. The
//! dedup maps are loaded once per run and kept current in memory by the
//! caller as new rows are inserted, so a promotion batch never re-queries
//! the catalog row by row.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::domain::entities::{Brand, CatalogProduct, Discount, Price, RawProductData, Supermarket};
use crate::infrastructure::staging_repository::{StoreError, StoreResult};

/// Key identifying one observed price point: (supermarket, product,
/// extraction date).
pub type PriceKey = (i64, i64, DateTime<Utc>);

/// In-memory view of the catalog dedup keys, loaded at the start of a
/// promotion run.
#[derive(Debug, Default)]
pub struct DedupMaps {
    /// Normalized supermarket name -> id.
    pub supermarkets: HashMap<String, i64>,
    /// Normalized brand name -> id.
    pub brands: HashMap<String, i64>,
    /// Normalized product name -> id.
    pub products: HashMap<String, i64>,
    /// Product URL -> catalog product id.
    pub raw_product_urls: HashMap<String, i64>,
    /// Price keys already recorded.
    pub price_keys: HashSet<PriceKey>,
}

#[derive(Clone)]
pub struct CatalogRepository {
    pool: Arc<SqlitePool>,
}

impl CatalogRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub async fn load_dedup_maps(&self) -> StoreResult<DedupMaps> {
        let mut maps = DedupMaps::default();

        for supermarket in self.fetch_supermarkets().await? {
            maps.supermarkets.insert(supermarket.name, supermarket.id);
        }
        for brand in self.fetch_brands().await? {
            maps.brands.insert(brand.normalized_name, brand.id);
        }
        for product in self.fetch_products().await? {
            maps.products.insert(product.normalized_name, product.id);
        }

        let rows = sqlx::query("SELECT product_id, product_url FROM raw_product_data")
            .fetch_all(&*self.pool)
            .await
            .map_err(StoreError::Query)?;
        for row in rows {
            maps.raw_product_urls.insert(
                row.try_get("product_url").map_err(StoreError::Query)?,
                row.try_get("product_id").map_err(StoreError::Query)?,
            );
        }

        let rows = sqlx::query("SELECT id_supermarket, id_product, extraction_date FROM prices")
            .fetch_all(&*self.pool)
            .await
            .map_err(StoreError::Query)?;
        for row in rows {
            maps.price_keys.insert((
                row.try_get("id_supermarket").map_err(StoreError::Query)?,
                row.try_get("id_product").map_err(StoreError::Query)?,
                row.try_get::<DateTime<Utc>, _>("extraction_date")
                    .map_err(StoreError::Query)?,
            ));
        }

        debug!(
            supermarkets = maps.supermarkets.len(),
            brands = maps.brands.len(),
            products = maps.products.len(),
            urls = maps.raw_product_urls.len(),
            prices = maps.price_keys.len(),
            "catalog dedup maps loaded"
        );
        Ok(maps)
    }

    pub async fn insert_supermarket(&self, name: &str) -> StoreResult<i64> {
        let result = sqlx::query("INSERT INTO supermarkets (name) VALUES (?)")
            .bind(name)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::Write)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_brand(&self, name: &str, normalized_name: &str) -> StoreResult<i64> {
        let result = sqlx::query("INSERT INTO brands (name, normalized_name) VALUES (?, ?)")
            .bind(name)
            .bind(normalized_name)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::Write)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_product(
        &self,
        name: &str,
        normalized_name: &str,
        quantity: Option<Decimal>,
        id_brand: Option<i64>,
    ) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO products (name, normalized_name, quantity, id_brand) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(normalized_name)
        .bind(quantity.map(|q| q.to_string()))
        .bind(id_brand)
        .execute(&*self.pool)
        .await
        .map_err(StoreError::Write)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_raw_product_data(&self, data: &RawProductData) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO raw_product_data (
                product_id, original_name, product_url, extraction_date, market
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(data.product_id)
        .bind(&data.original_name)
        .bind(&data.product_url)
        .bind(data.extraction_date)
        .bind(&data.market)
        .execute(&*self.pool)
        .await
        .map_err(StoreError::Write)?;
        Ok(())
    }

    pub async fn insert_price(
        &self,
        id_supermarket: i64,
        id_product: i64,
        extraction_date: DateTime<Utc>,
        value: i64,
        currency: Option<&str>,
    ) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO prices (
                id_supermarket, id_product, extraction_date, value, currency
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id_supermarket)
        .bind(id_product)
        .bind(extraction_date)
        .bind(value)
        .bind(currency)
        .execute(&*self.pool)
        .await
        .map_err(StoreError::Write)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_discount(
        &self,
        id_price: i64,
        unit_value: i64,
        condition_type: &str,
        min_qty: Option<i64>,
        multiple_qty: i64,
    ) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO discounts (
                id_price, unit_value, condition_type, min_qty, multiple_qty
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id_price)
        .bind(unit_value)
        .bind(condition_type)
        .bind(min_qty)
        .bind(multiple_qty)
        .execute(&*self.pool)
        .await
        .map_err(StoreError::Write)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn fetch_supermarkets(&self) -> StoreResult<Vec<Supermarket>> {
        let rows = sqlx::query("SELECT id, name FROM supermarkets")
            .fetch_all(&*self.pool)
            .await
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|row| {
                Ok(Supermarket {
                    id: row.try_get("id").map_err(StoreError::Query)?,
                    name: row.try_get("name").map_err(StoreError::Query)?,
                })
            })
            .collect()
    }

    pub async fn fetch_brands(&self) -> StoreResult<Vec<Brand>> {
        let rows = sqlx::query("SELECT id, name, normalized_name FROM brands")
            .fetch_all(&*self.pool)
            .await
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|row| {
                Ok(Brand {
                    id: row.try_get("id").map_err(StoreError::Query)?,
                    name: row.try_get("name").map_err(StoreError::Query)?,
                    normalized_name: row.try_get("normalized_name").map_err(StoreError::Query)?,
                })
            })
            .collect()
    }

    pub async fn fetch_products(&self) -> StoreResult<Vec<CatalogProduct>> {
        let rows = sqlx::query("SELECT id, name, normalized_name, quantity, id_brand FROM products")
            .fetch_all(&*self.pool)
            .await
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|row| {
                let quantity: Option<String> = row.try_get("quantity").map_err(StoreError::Query)?;
                let quantity = quantity
                    .as_deref()
                    .map(Decimal::from_str)
                    .transpose()
                    .map_err(|e| StoreError::Query(sqlx::Error::Decode(Box::new(e))))?;
                Ok(CatalogProduct {
                    id: row.try_get("id").map_err(StoreError::Query)?,
                    name: row.try_get("name").map_err(StoreError::Query)?,
                    normalized_name: row.try_get("normalized_name").map_err(StoreError::Query)?,
                    quantity,
                    id_brand: row.try_get("id_brand").map_err(StoreError::Query)?,
                })
            })
            .collect()
    }

    /// Prices recorded for a product, newest extraction first. Used by
    /// integration tests and ad-hoc inspection.
    pub async fn fetch_prices_for_product(&self, id_product: i64) -> StoreResult<Vec<Price>> {
        let rows = sqlx::query(
            r#"
            SELECT id, id_supermarket, id_product, extraction_date, value, currency
            FROM prices
            WHERE id_product = ?
            ORDER BY extraction_date DESC
            "#,
        )
        .bind(id_product)
        .fetch_all(&*self.pool)
        .await
        .map_err(StoreError::Query)?;

        rows.into_iter()
            .map(|row| {
                Ok(Price {
                    id: row.try_get("id").map_err(StoreError::Query)?,
                    id_supermarket: row.try_get("id_supermarket").map_err(StoreError::Query)?,
                    id_product: row.try_get("id_product").map_err(StoreError::Query)?,
                    extraction_date: row
                        .try_get::<DateTime<Utc>, _>("extraction_date")
                        .map_err(StoreError::Query)?,
                    value: row.try_get("value").map_err(StoreError::Query)?,
                    currency: row.try_get("currency").map_err(StoreError::Query)?,
                })
            })
            .collect()
    }

    pub async fn fetch_discounts_for_price(&self, id_price: i64) -> StoreResult<Vec<Discount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, id_price, unit_value, condition_type, min_qty, multiple_qty
            FROM discounts
            WHERE id_price = ?
            ORDER BY id ASC
            "#,
        )
        .bind(id_price)
        .fetch_all(&*self.pool)
        .await
        .map_err(StoreError::Query)?;

        rows.into_iter()
            .map(|row| {
                Ok(Discount {
                    id: row.try_get("id").map_err(StoreError::Query)?,
                    id_price: row.try_get("id_price").map_err(StoreError::Query)?,
                    unit_value: row.try_get("unit_value").map_err(StoreError::Query)?,
                    condition_type: row.try_get("condition_type").map_err(StoreError::Query)?,
                    min_qty: row.try_get("min_qty").map_err(StoreError::Query)?,
                    multiple_qty: row.try_get("multiple_qty").map_err(StoreError::Query)?,
                })
            })
            .collect()
    }
}
