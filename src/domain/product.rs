//! Staged product entity
//!
//! A `StagedProduct` is built in memory by a market extractor, gets its
//! snowflake id and field normalization (uppercased unit/currency) at
//! construction, owns the discounts discovered alongside it, and is persisted
//! as an immutable staging row. The only later mutation is the promotion
//! pass flipping `is_processed`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::discount::StagedDiscount;
use crate::domain::error::DomainResult;
use crate::domain::identifier::IdGenerator;

pub const DEFAULT_CURRENCY: &str = "BRL";

/// Field-ordered tuple form of a staged product; order matches the
/// `stage_scraping_products` insert column list.
pub type ProductTuple<'a> = (
    i64,
    &'a str,
    &'a str,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    i64,
    Option<Decimal>,
    Option<&'a str>,
    Option<&'a str>,
    DateTime<Utc>,
    Option<&'a str>,
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedProduct {
    pub id: i64,
    pub name: String,
    pub market: String,
    /// Minor currency units.
    pub price: i64,
    pub extraction_date: DateTime<Utc>,

    pub category: Option<String>,
    pub brand: Option<String>,
    pub product_url: Option<String>,
    pub source_id: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub quantity: Option<Decimal>,
    /// Normalized to uppercase at construction.
    pub unit_of_measure: Option<String>,
    pub extraction_url: Option<String>,
    /// Uppercase ISO 4217 code, defaults to [`DEFAULT_CURRENCY`].
    pub currency: Option<String>,

    pub discounts: Vec<StagedDiscount>,

    /// Database-assigned, absent until persisted.
    pub created_at: Option<DateTime<Utc>>,
}

impl StagedProduct {
    /// Construct a staged product with a freshly issued id and the default
    /// currency. Optional fields are set through the `with_*` builders.
    pub fn new(
        ids: &IdGenerator,
        name: impl Into<String>,
        market: impl Into<String>,
        price: i64,
        extraction_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: ids.next_id()?,
            name: name.into(),
            market: market.into(),
            price,
            extraction_date,
            category: None,
            brand: None,
            product_url: None,
            source_id: None,
            quantity: None,
            unit_of_measure: None,
            extraction_url: None,
            currency: Some(DEFAULT_CURRENCY.to_string()),
            discounts: Vec::new(),
            created_at: None,
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_product_url(mut self, url: impl Into<String>) -> Self {
        self.product_url = Some(url.into());
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_extraction_url(mut self, url: impl Into<String>) -> Self {
        self.extraction_url = Some(url.into());
        self
    }

    /// Set quantity and its unit; the unit is uppercased for consistency.
    pub fn with_quantity(mut self, quantity: Decimal, unit_of_measure: &str) -> Self {
        self.quantity = Some(quantity);
        self.unit_of_measure = Some(unit_of_measure.to_uppercase());
        self
    }

    pub fn with_unit_of_measure(mut self, unit_of_measure: &str) -> Self {
        self.unit_of_measure = Some(unit_of_measure.to_uppercase());
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_uppercase());
        self
    }

    /// Attach a discount, rewriting its `product_id` back-reference to this
    /// product's id.
    pub fn add_discount(&mut self, mut discount: StagedDiscount) {
        discount.product_id = self.id;
        self.discounts.push(discount);
    }

    pub fn add_percentage_quantity_discount(
        &mut self,
        discounted_price: i64,
        min_quantity: i64,
        conditions_text: Option<String>,
    ) {
        self.add_discount(StagedDiscount::percentage_quantity(
            discounted_price,
            min_quantity,
            conditions_text,
        ));
    }

    pub fn add_card_discount(&mut self, discounted_price: i64, conditions_text: Option<String>) {
        self.add_discount(StagedDiscount::card(discounted_price, conditions_text));
    }

    pub fn add_wholesale_discount(
        &mut self,
        discounted_price: i64,
        min_quantity: i64,
        conditions_text: Option<String>,
    ) {
        self.add_discount(StagedDiscount::wholesale(
            discounted_price,
            min_quantity,
            conditions_text,
        ));
    }

    pub fn add_buy_x_get_y_discount(
        &mut self,
        discounted_price: i64,
        buy_quantity: i64,
        get_quantity: i64,
        conditions_text: Option<String>,
    ) {
        self.add_discount(StagedDiscount::buy_x_get_y(
            discounted_price,
            buy_quantity,
            get_quantity,
            conditions_text,
        ));
    }

    /// Tuple form for bulk-insert parameter binding.
    pub fn to_tuple(&self) -> ProductTuple<'_> {
        (
            self.id,
            &self.name,
            &self.market,
            self.category.as_deref(),
            self.brand.as_deref(),
            self.product_url.as_deref(),
            self.source_id.as_deref(),
            self.price,
            self.quantity,
            self.unit_of_measure.as_deref(),
            self.extraction_url.as_deref(),
            self.extraction_date,
            self.currency.as_deref(),
        )
    }

    /// Nested document form for file/debug export; optional fields serialize
    /// as `null`, timestamps as ISO-8601.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn generator() -> IdGenerator {
        IdGenerator::new(0).unwrap()
    }

    fn sample(ids: &IdGenerator) -> StagedProduct {
        let extraction_date = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        StagedProduct::new(ids, "Leite Integral", "Tenda", 550, extraction_date)
            .unwrap()
            .with_category("Laticínios")
            .with_brand("Italac")
            .with_product_url("https://x/1")
            .with_source_id("98765")
            .with_quantity(Decimal::from_str("1.5").unwrap(), "kg")
            .with_extraction_url("https://x/cat?page=1")
    }

    #[test]
    fn normalizes_unit_and_currency_at_construction() {
        let ids = generator();
        let product = sample(&ids).with_currency("brl");

        assert_eq!(product.unit_of_measure.as_deref(), Some("KG"));
        assert_eq!(product.currency.as_deref(), Some("BRL"));
        assert!(product.id > 0);
        assert!(product.created_at.is_none());
    }

    #[test]
    fn add_discount_sets_back_reference() {
        let ids = generator();
        let mut product = sample(&ids);

        product.add_wholesale_discount(450, 6, None);
        product.add_card_discount(450, None);

        assert_eq!(product.discounts.len(), 2);
        assert!(product.discounts.iter().all(|d| d.product_id == product.id));
    }

    #[test]
    fn tuple_and_document_forms_carry_identical_values() {
        let ids = generator();
        let mut product = sample(&ids);
        product.add_wholesale_discount(450, 6, None);

        let tuple = product.to_tuple();
        let doc = product.to_document();

        assert_eq!(doc["id"].as_i64(), Some(tuple.0));
        assert_eq!(doc["name"].as_str(), Some(tuple.1));
        assert_eq!(doc["market"].as_str(), Some(tuple.2));
        assert_eq!(doc["category"].as_str(), tuple.3);
        assert_eq!(doc["brand"].as_str(), tuple.4);
        assert_eq!(doc["product_url"].as_str(), tuple.5);
        assert_eq!(doc["source_id"].as_str(), tuple.6);
        assert_eq!(doc["price"].as_i64(), Some(tuple.7));
        assert_eq!(doc["quantity"].as_f64(), Some(1.5));
        assert_eq!(doc["unit_of_measure"].as_str(), tuple.9);
        assert_eq!(doc["extraction_url"].as_str(), tuple.10);
        assert_eq!(doc["currency"].as_str(), tuple.12);
        assert!(doc["created_at"].is_null());

        // ISO timestamp in the document parses back to the same instant.
        let parsed: DateTime<Utc> = doc["extraction_date"].as_str().unwrap().parse().unwrap();
        assert_eq!(parsed, tuple.11);

        // Document round-trips through serde into an equal entity.
        let restored: StagedProduct = serde_json::from_value(doc).unwrap();
        assert_eq!(restored, product);
    }
}
