//! Tenda market (JSON API)
//!
//! Categories come from the departments endpoint; products from the
//! paginated category endpoint. The API authenticates with a bearer token
//! sent on both `Authorization` and `X-Authorization`. Products carrying
//! `wholesalePrices` yield a wholesale discount plus a card discount at the
//! same price, per the storefront's pricing rules.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::application::extractor::{Category, MarketExtractor, ProductPage};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::identifier::IdGenerator;
use crate::domain::numeric;
use crate::domain::product::StagedProduct;
use crate::infrastructure::config::{HttpConfig, TendaConfig};
use crate::infrastructure::http_client::HttpClient;

pub const MARKET: &str = "Tenda";

#[derive(Debug, Deserialize)]
struct DepartmentPayload {
    #[serde(rename = "idDepartment")]
    id: Option<serde_json::Value>,
    #[serde(rename = "nameDepartment")]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CategoryPagePayload {
    #[serde(default)]
    total_pages: Option<u32>,
    #[serde(default)]
    total_products: Option<usize>,
    #[serde(default)]
    products: Vec<ProductPayload>,
}

#[derive(Debug, Deserialize)]
struct ProductPayload {
    name: Option<String>,
    id: Option<serde_json::Value>,
    brand: Option<String>,
    url: Option<String>,
    price: Option<serde_json::Value>,
    #[serde(rename = "wholesalePrices", default)]
    wholesale_prices: Vec<WholesalePricePayload>,
}

#[derive(Debug, Deserialize)]
struct WholesalePricePayload {
    price: Option<serde_json::Value>,
    #[serde(rename = "minQuantity")]
    min_quantity: Option<i64>,
}

pub struct TendaMarket {
    http: HttpClient,
    api_base_url: String,
    ids: Arc<IdGenerator>,
    extraction_date: DateTime<Utc>,
}

impl TendaMarket {
    pub fn new(
        config: &TendaConfig,
        http_config: &HttpConfig,
        ids: Arc<IdGenerator>,
        extraction_date: DateTime<Utc>,
    ) -> Result<Self> {
        let bearer = format!("Bearer {}", config.bearer_token);
        let http = HttpClient::with_headers(
            http_config.clone(),
            &[("Authorization", &bearer), ("X-Authorization", &bearer)],
        )?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            ids,
            extraction_date,
        })
    }

    fn category_url(&self, category_id: &str, page: u32) -> String {
        format!(
            "{}/public/store/category/{}/products?&page={}&order=relevance",
            self.api_base_url, category_id, page
        )
    }

    fn parse_page(&self, payload: CategoryPagePayload, category_name: &str, page_url: &str) -> Result<ProductPage> {
        let mut products = Vec::with_capacity(payload.products.len());

        for item in payload.products {
            let Some(name) = item.name.as_deref().filter(|n| !n.trim().is_empty()) else {
                continue;
            };

            let price = price_value_to_minor_units(item.price.as_ref())
                .with_context(|| format!("price of '{name}'"))?;

            let mut product = StagedProduct::new(&self.ids, name, MARKET, price, self.extraction_date)?
                .with_category(category_name)
                .with_extraction_url(page_url);

            if let Some(brand) = item.brand.as_deref().filter(|b| !b.trim().is_empty()) {
                product = product.with_brand(brand);
            }
            if let Some(url) = item.url.as_deref().filter(|u| !u.trim().is_empty()) {
                product = product.with_product_url(url);
            }
            if let Some(source_id) = item.id.as_ref().map(value_to_string) {
                product = product.with_source_id(source_id);
            }

            for wholesale in &item.wholesale_prices {
                let discounted = price_value_to_minor_units(wholesale.price.as_ref())
                    .with_context(|| format!("wholesale price of '{name}'"))?;
                product.add_wholesale_discount(discounted, wholesale.min_quantity.unwrap_or(1), None);
                product.add_card_discount(discounted, None);
            }

            products.push(product);
        }

        Ok(ProductPage {
            products,
            total_pages: payload.total_pages,
            total_products: payload.total_products,
        })
    }
}

#[async_trait]
impl MarketExtractor for TendaMarket {
    fn market(&self) -> &str {
        MARKET
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let url = format!("{}/recommendations/departments", self.api_base_url);
        info!(market = MARKET, url = %url, "listing categories");

        let departments: Vec<DepartmentPayload> = self
            .http
            .get_json(&url)
            .await
            .context("fetching department list")?;

        let categories: Vec<Category> = departments
            .into_iter()
            .filter_map(|dept| {
                let name = dept.name?;
                Some(Category {
                    id: dept.id.as_ref().map(value_to_string),
                    name,
                    url: None,
                })
            })
            .collect();

        info!(market = MARKET, count = categories.len(), "categories found");
        Ok(categories)
    }

    async fn fetch_page(&self, category: &Category, page: u32) -> Result<ProductPage> {
        let category_id = category
            .id
            .as_deref()
            .with_context(|| format!("category '{}' has no id", category.name))?;
        let url = self.category_url(category_id, page);

        let payload: CategoryPagePayload = self
            .http
            .get_json(&url)
            .await
            .with_context(|| format!("fetching category '{}' page {page}", category.name))?;

        self.parse_page(payload, &category.name, &url)
    }
}

/// API prices arrive as JSON numbers or formatted strings depending on the
/// endpoint version; both convert through the decimal parser.
fn price_value_to_minor_units(value: Option<&serde_json::Value>) -> DomainResult<i64> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::String(text)) => numeric::price_to_minor_units(Some(text)),
        Some(serde_json::Value::Number(n)) => {
            let decimal: Decimal = n
                .to_string()
                .parse()
                .map_err(|_| DomainError::InvalidNumericFormat(n.to_string()))?;
            numeric::decimal_to_minor_units(decimal)
                .ok_or_else(|| DomainError::InvalidNumericFormat(n.to_string()))
        }
        Some(other) => Err(DomainError::InvalidNumericFormat(other.to_string())),
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
