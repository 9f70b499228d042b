//! St Marche market (HTML)
//!
//! Categories come from the storefront's category slider; products from the
//! paginated collection pages. The storefront keeps serving the last real
//! page for out-of-range page numbers, so traversal relies on the shared
//! URL dedup to detect stale pages. Prices arrive as display text
//! ("R$\u{a0}25,89") and go through the decimal parser. Product names may
//! carry a per-customer purchase limit suffix ("(máx 24 unidades por cpf)")
//! which is stripped from the stored name.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::application::extractor::{Category, MarketExtractor, ProductPage};
use crate::domain::identifier::IdGenerator;
use crate::domain::numeric;
use crate::domain::product::StagedProduct;
use crate::infrastructure::config::{HttpConfig, MarcheConfig};
use crate::infrastructure::http_client::HttpClient;

pub const MARKET: &str = "StMarche";

static CATEGORY_SLIDER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class^="category-slider"]"#).expect("selector"));
static PRODUCT_CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.algolia-insights").expect("selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h4").expect("selector"));
static SPAN: Lazy<Selector> = Lazy::new(|| Selector::parse("span").expect("selector"));

static PURCHASE_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(máx\s+([\d.,]+)\s*[a-zA-ZÀ-ÿ%]*\s+por\s+cpf\)").expect("regex")
});

pub struct MarcheMarket {
    http: HttpClient,
    base_url: String,
    store_suffix: String,
    ids: Arc<IdGenerator>,
    extraction_date: DateTime<Utc>,
}

impl MarcheMarket {
    pub fn new(
        config: &MarcheConfig,
        http_config: &HttpConfig,
        ids: Arc<IdGenerator>,
        extraction_date: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(http_config.clone())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store_suffix: format!("?store_id={}", config.store_id),
            ids,
            extraction_date,
        })
    }

    fn parse_categories(&self, html: &str) -> Vec<Category> {
        let document = Html::parse_document(html);

        let Some(slider) = document.select(&CATEGORY_SLIDER).next() else {
            return Vec::new();
        };

        slider
            .select(&ANCHOR)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href")?;
                let name = collapse_text(anchor);
                if name.is_empty() {
                    return None;
                }
                Some(Category {
                    id: None,
                    name,
                    url: Some(format!("{}{}{}", self.base_url, href, self.store_suffix)),
                })
            })
            .collect()
    }

    fn parse_listing_page(&self, html: &str, category_name: &str, page_url: &str) -> Result<ProductPage> {
        let document = Html::parse_document(html);
        let mut products = Vec::new();

        for card in document.select(&PRODUCT_CARD) {
            for anchor in card.select(&ANCHOR) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let Some(title) = anchor.select(&TITLE).next() else {
                    continue;
                };

                let (name, purchase_limit) = strip_purchase_limit(&collapse_text(title));
                if name.is_empty() {
                    continue;
                }
                if let Some(limit) = purchase_limit {
                    debug!(market = MARKET, product = %name, %limit, "purchase limit on listing");
                }

                let mut price_text = span_text(card, "_product-card-price-regular");
                let unit = span_text(card, "_product-card-price-measurement")
                    .map(|u| u.to_uppercase());
                let mut quantity: Option<Decimal> = None;

                // Weighed goods display a per-weight price and a pack
                // measurement alongside the unit.
                if unit.as_deref().is_some_and(|u| u != "UN") {
                    if let Some(weight_price) = span_text(card, "_product-card-price-measurement-weight") {
                        price_text = Some(weight_price);
                    }
                    if let Some(measurement) = span_text(card, "_product-card-measurement") {
                        quantity = Some(numeric::parse_decimal(Some(&measurement))?);
                    }
                }

                let price = numeric::price_to_minor_units(price_text.as_deref())
                    .with_context(|| format!("price of '{name}'"))?;

                let mut product =
                    StagedProduct::new(&self.ids, &name, MARKET, price, self.extraction_date)?
                        .with_category(category_name)
                        .with_product_url(format!("{}{}", self.base_url, href))
                        .with_extraction_url(page_url);

                match (quantity, unit.as_deref()) {
                    (Some(quantity), Some(unit)) => {
                        product = product.with_quantity(quantity, unit);
                    }
                    (None, Some(unit)) => {
                        product = product.with_unit_of_measure(unit);
                    }
                    _ => {}
                }

                products.push(product);
            }
        }

        Ok(ProductPage {
            products,
            total_pages: None,
            total_products: None,
        })
    }
}

#[async_trait]
impl MarketExtractor for MarcheMarket {
    fn market(&self) -> &str {
        MARKET
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let url = format!("{}{}", self.base_url, self.store_suffix);
        info!(market = MARKET, url = %url, "listing categories");

        let html = self
            .http
            .get_text(&url)
            .await
            .context("fetching storefront page")?;

        let categories = self.parse_categories(&html);
        info!(market = MARKET, count = categories.len(), "categories found");
        Ok(categories)
    }

    async fn fetch_page(&self, category: &Category, page: u32) -> Result<ProductPage> {
        let category_url = category
            .url
            .as_deref()
            .with_context(|| format!("category '{}' has no url", category.name))?;
        let url = format!("{category_url}&page={page}");

        let html = self
            .http
            .get_text(&url)
            .await
            .with_context(|| format!("fetching category '{}' page {page}", category.name))?;

        self.parse_listing_page(&html, &category.name, &url)
    }
}

/// Text content of an element with inner whitespace collapsed.
fn collapse_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First span under `scope` whose class list has an entry starting with
/// `prefix`. The storefront suffixes its utility classes with build hashes,
/// so only the prefix is stable.
fn span_text(scope: ElementRef, prefix: &str) -> Option<String> {
    scope
        .select(&SPAN)
        .find(|el| el.value().classes().any(|class| class.starts_with(prefix)))
        .map(|el| collapse_text(el))
        .filter(|text| !text.is_empty())
}

/// Split a "(máx N <unit> por cpf)" purchase-limit suffix off a product
/// name. Returns the cleaned name and the limit when present.
fn strip_purchase_limit(name: &str) -> (String, Option<Decimal>) {
    let Some(captures) = PURCHASE_LIMIT.captures(name) else {
        return (name.trim().to_string(), None);
    };

    let limit = captures
        .get(1)
        .and_then(|m| m.as_str().replace(',', ".").parse::<Decimal>().ok());
    let cleaned = PURCHASE_LIMIT.replace_all(name, "").trim().to_string();
    (cleaned, limit)
}
