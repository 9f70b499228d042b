//! Normalized catalog entities
//!
//! Typed rows for the promotion target schema. Every table gets an explicit
//! record type so the promotion pass works with compile-time-checked fields
//! instead of dynamic row maps.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supermarket {
    pub id: i64,
    /// Normalized display form ("Tenda"), the dedup key.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    /// Dedup key.
    pub normalized_name: String,
}

/// A catalog product, distinct from the staged form: deduplicated by
/// normalized name and linked to a brand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: i64,
    pub name: String,
    pub normalized_name: String,
    pub quantity: Option<Decimal>,
    pub id_brand: Option<i64>,
}

/// Provenance link between a catalog product and the page it was seen on.
/// Deduplicated by `product_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProductData {
    pub product_id: i64,
    pub original_name: String,
    pub product_url: String,
    pub extraction_date: DateTime<Utc>,
    pub market: String,
}

/// One observed price point; deduplicated by
/// (supermarket, product, extraction date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: i64,
    pub id_supermarket: i64,
    pub id_product: i64,
    pub extraction_date: DateTime<Utc>,
    /// Minor currency units.
    pub value: i64,
    pub currency: Option<String>,
}

/// A normalized discount linked to a price point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    pub id: i64,
    pub id_price: i64,
    /// Effective per-unit price in minor units under the discount rule.
    pub unit_value: i64,
    pub condition_type: String,
    pub min_qty: Option<i64>,
    /// How many units the rule spans (1 for flat card/wholesale prices).
    pub multiple_qty: i64,
}
