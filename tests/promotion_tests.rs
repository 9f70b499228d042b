//! Promotion engine tests: the staged-row-to-catalog scenario, discount
//! linking, and idempotent re-runs.

use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use mercado_etl::application::promotion::PromotionEngine;
use mercado_etl::domain::identifier::IdGenerator;
use mercado_etl::domain::product::StagedProduct;
use mercado_etl::infrastructure::catalog_repository::CatalogRepository;
use mercado_etl::infrastructure::database_connection::DatabaseConnection;
use mercado_etl::infrastructure::staging_repository::StagingRepository;

struct Fixture {
    _dir: tempfile::TempDir,
    pool: Arc<sqlx::SqlitePool>,
    staging: StagingRepository,
    catalog: CatalogRepository,
    engine: PromotionEngine,
    ids: IdGenerator,
}

async fn fixture() -> Result<Fixture> {
    let dir = tempdir()?;
    let url = format!("sqlite:{}", dir.path().join("promotion.db").display());
    let db = DatabaseConnection::new(&url).await?;
    db.migrate().await?;
    let pool = Arc::new(db.pool().clone());

    let staging = StagingRepository::new(Arc::clone(&pool));
    let catalog = CatalogRepository::new(Arc::clone(&pool));
    let engine = PromotionEngine::new(staging.clone(), catalog.clone(), 0);

    Ok(Fixture {
        _dir: dir,
        pool,
        staging,
        catalog,
        engine,
        ids: IdGenerator::new(1)?,
    })
}

async fn count(pool: &sqlx::SqlitePool, table: &str) -> Result<i64> {
    let value = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(value)
}

#[tokio::test]
async fn promotes_a_staged_row_into_every_catalog_table() -> Result<()> {
    let fx = fixture().await?;
    let extraction_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let row = StagedProduct::new(&fx.ids, "Leite Integral", "Tenda", 550, extraction_date)?
        .with_brand("Italac")
        .with_product_url("https://x/1");
    fx.staging.insert_products(&[row]).await?;

    let summary = fx.engine.run(None).await?;
    assert_eq!(summary.rows_promoted, 1);
    assert_eq!(summary.prices_inserted, 1);
    assert_eq!(summary.rows_failed, 0);

    assert_eq!(count(&fx.pool, "supermarkets").await?, 1);
    assert_eq!(count(&fx.pool, "brands").await?, 1);
    assert_eq!(count(&fx.pool, "products").await?, 1);
    assert_eq!(count(&fx.pool, "raw_product_data").await?, 1);
    assert_eq!(count(&fx.pool, "prices").await?, 1);

    let supermarket: String = sqlx::query_scalar("SELECT name FROM supermarkets")
        .fetch_one(&*fx.pool)
        .await?;
    assert_eq!(supermarket, "Tenda");

    let price: i64 = sqlx::query_scalar("SELECT value FROM prices")
        .fetch_one(&*fx.pool)
        .await?;
    assert_eq!(price, 550);

    let processed: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM stage_scraping_products WHERE is_processed = 1")
            .fetch_one(&*fx.pool)
            .await?;
    assert_eq!(processed, 1);
    Ok(())
}

#[tokio::test]
async fn links_staged_discounts_to_the_new_price() -> Result<()> {
    let fx = fixture().await?;
    let extraction_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let mut row = StagedProduct::new(&fx.ids, "Cerveja Lata", "Tenda", 549, extraction_date)?
        .with_product_url("https://x/cerveja");
    row.add_wholesale_discount(499, 12, None);
    row.add_card_discount(499, None);
    fx.staging.insert_products_with_discounts(&[row]).await?;

    let summary = fx.engine.run(None).await?;
    assert_eq!(summary.discounts_inserted, 2);

    let product = &fx.catalog.fetch_products().await?[0];
    let prices = fx.catalog.fetch_prices_for_product(product.id).await?;
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].value, 549);

    let discounts = fx.catalog.fetch_discounts_for_price(prices[0].id).await?;
    assert_eq!(discounts.len(), 2);
    assert_eq!(discounts[0].condition_type, "WHOLESALE");
    assert_eq!(discounts[0].unit_value, 499);
    assert_eq!(discounts[0].min_qty, Some(12));
    assert_eq!(discounts[0].multiple_qty, 1);
    assert_eq!(discounts[1].condition_type, "CARD");
    assert_eq!(discounts[1].min_qty, None);
    Ok(())
}

#[tokio::test]
async fn rerun_over_promoted_state_inserts_nothing() -> Result<()> {
    let fx = fixture().await?;
    let extraction_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let row = StagedProduct::new(&fx.ids, "Leite Integral", "Tenda", 550, extraction_date)?
        .with_brand("Italac")
        .with_product_url("https://x/1");
    fx.staging.insert_products(&[row]).await?;

    fx.engine.run(None).await?;
    let second = fx.engine.run(None).await?;
    assert_eq!(second.rows_seen, 0);

    assert_eq!(count(&fx.pool, "supermarkets").await?, 1);
    assert_eq!(count(&fx.pool, "brands").await?, 1);
    assert_eq!(count(&fx.pool, "products").await?, 1);
    assert_eq!(count(&fx.pool, "raw_product_data").await?, 1);
    assert_eq!(count(&fx.pool, "prices").await?, 1);
    Ok(())
}

#[tokio::test]
async fn same_product_twice_in_one_run_records_one_price() -> Result<()> {
    let fx = fixture().await?;
    let extraction_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    // The same listing seen under two categories in the same extraction.
    let first = StagedProduct::new(&fx.ids, "Leite Integral", "Tenda", 550, extraction_date)?
        .with_category("Laticinios")
        .with_product_url("https://x/1");
    let second = StagedProduct::new(&fx.ids, "Leite Integral", "Tenda", 550, extraction_date)?
        .with_category("Ofertas")
        .with_product_url("https://x/1");
    fx.staging.insert_products(&[first, second]).await?;

    let summary = fx.engine.run(None).await?;
    assert_eq!(summary.rows_promoted, 2);
    assert_eq!(summary.prices_inserted, 1);
    assert_eq!(summary.prices_already_recorded, 1);

    assert_eq!(count(&fx.pool, "products").await?, 1);
    assert_eq!(count(&fx.pool, "prices").await?, 1);
    assert_eq!(count(&fx.pool, "raw_product_data").await?, 1);

    // Both rows still end up processed.
    let unprocessed = fx.staging.fetch_unprocessed(None, 0).await?;
    assert!(unprocessed.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_brand_leaves_a_null_brand_reference() -> Result<()> {
    let fx = fixture().await?;
    let extraction_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let row = StagedProduct::new(&fx.ids, "Sal Grosso", "StMarche", 350, extraction_date)?
        .with_product_url("https://x/sal");
    fx.staging.insert_products(&[row]).await?;

    fx.engine.run(None).await?;

    assert_eq!(count(&fx.pool, "brands").await?, 0);
    let id_brand: Option<i64> = sqlx::query_scalar("SELECT id_brand FROM products")
        .fetch_one(&*fx.pool)
        .await?;
    assert!(id_brand.is_none());
    Ok(())
}

#[tokio::test]
async fn normalizes_names_for_dedup_but_keeps_display_forms() -> Result<()> {
    let fx = fixture().await?;
    let extraction_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

    // Accents and casing differ, the normalized identity does not.
    let first = StagedProduct::new(&fx.ids, "Pão Francês", "StMarche", 120, extraction_date)?
        .with_brand("São João")
        .with_product_url("https://x/pao");
    let second = StagedProduct::new(&fx.ids, "PAO FRANCES", "StMarche", 130, later)?
        .with_brand("SAO JOAO")
        .with_product_url("https://x/pao-2");
    fx.staging.insert_products(&[first, second]).await?;

    fx.engine.run(None).await?;

    assert_eq!(count(&fx.pool, "brands").await?, 1);
    assert_eq!(count(&fx.pool, "products").await?, 1);
    // Distinct extraction dates mean two price points for the one product.
    assert_eq!(count(&fx.pool, "prices").await?, 2);

    let (name, normalized): (String, String) =
        sqlx::query_as("SELECT name, normalized_name FROM products")
            .fetch_one(&*fx.pool)
            .await?;
    assert_eq!(name, "Pão Francês");
    assert_eq!(normalized, "Pao frances");
    Ok(())
}
