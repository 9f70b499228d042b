//! Staging store tests: two-phase batch semantics and the async write path.

use std::sync::Arc;
use std::sync::mpsc;

use anyhow::Result;
use chrono::Utc;
use tempfile::tempdir;

use mercado_etl::domain::identifier::IdGenerator;
use mercado_etl::domain::product::StagedProduct;
use mercado_etl::infrastructure::database_connection::DatabaseConnection;
use mercado_etl::infrastructure::staging_repository::StagingRepository;

async fn staging_fixture() -> Result<(tempfile::TempDir, StagingRepository, Arc<sqlx::SqlitePool>)>
{
    let dir = tempdir()?;
    let url = format!("sqlite:{}", dir.path().join("staging.db").display());
    let db = DatabaseConnection::new(&url).await?;
    db.migrate().await?;
    let pool = Arc::new(db.pool().clone());
    Ok((dir, StagingRepository::new(Arc::clone(&pool)), pool))
}

fn product_with_discount(ids: &IdGenerator, name: &str, url: &str) -> StagedProduct {
    let mut product = StagedProduct::new(ids, name, "Tenda", 1890, Utc::now())
        .unwrap()
        .with_category("Mercearia")
        .with_product_url(url);
    product.add_wholesale_discount(1690, 10, None);
    product.add_card_discount(1690, None);
    product
}

#[tokio::test]
async fn two_phase_write_persists_products_then_discounts() -> Result<()> {
    let (_dir, staging, pool) = staging_fixture().await?;
    let ids = IdGenerator::new(1)?;

    let products = vec![
        product_with_discount(&ids, "Arroz Tipo 1", "https://x/arroz"),
        product_with_discount(&ids, "Feijao Carioca", "https://x/feijao"),
    ];
    staging.insert_products_with_discounts(&products).await?;

    let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stage_scraping_products")
        .fetch_one(&*pool)
        .await?;
    assert_eq!(product_count, 2);

    let discounts = staging.fetch_staged_discounts().await?;
    assert_eq!(discounts.len(), 4);
    assert!(discounts.iter().all(|d| d.id.is_some()));
    assert!(discounts
        .iter()
        .any(|d| d.product_id == products[0].id && d.discounted_price == 1690));
    Ok(())
}

#[tokio::test]
async fn failed_product_phase_leaves_no_rows_and_no_discounts() -> Result<()> {
    let (_dir, staging, pool) = staging_fixture().await?;
    let ids = IdGenerator::new(1)?;

    let first = product_with_discount(&ids, "Arroz Tipo 1", "https://x/arroz");
    let mut duplicate = product_with_discount(&ids, "Arroz Duplicado", "https://x/dup");
    // Primary key collision makes the product phase fail mid-batch.
    duplicate.id = first.id;

    let result = staging
        .insert_products_with_discounts(&[first, duplicate])
        .await;
    assert!(result.is_err());

    let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stage_scraping_products")
        .fetch_one(&*pool)
        .await?;
    assert_eq!(product_count, 0);

    let discount_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stage_discounts")
        .fetch_one(&*pool)
        .await?;
    assert_eq!(discount_count, 0);
    Ok(())
}

#[tokio::test]
async fn async_write_reports_through_the_callback() -> Result<()> {
    let (_dir, staging, _pool) = staging_fixture().await?;
    let ids = IdGenerator::new(1)?;
    let products = vec![product_with_discount(&ids, "Arroz Tipo 1", "https://x/arroz")];

    let (tx, rx) = mpsc::channel();
    let handle = staging.insert_products_with_discounts_async(
        products,
        "Mercearia".to_string(),
        move |success, count, label| {
            tx.send((success, count, label.to_string())).unwrap();
        },
    );

    assert!(handle.await?);
    let (success, count, label) = rx.recv()?;
    assert!(success);
    assert_eq!(count, 1);
    assert_eq!(label, "Mercearia");
    Ok(())
}

#[tokio::test]
async fn async_write_failure_reports_false_without_panicking() -> Result<()> {
    let (_dir, staging, _pool) = staging_fixture().await?;
    let ids = IdGenerator::new(1)?;

    let first = product_with_discount(&ids, "Arroz", "https://x/1");
    let mut duplicate = product_with_discount(&ids, "Dup", "https://x/2");
    duplicate.id = first.id;

    let (tx, rx) = mpsc::channel();
    let handle = staging.insert_products_with_discounts_async(
        vec![first, duplicate],
        "Mercearia".to_string(),
        move |success, count, _label| {
            tx.send((success, count)).unwrap();
        },
    );

    assert!(!handle.await?);
    assert_eq!(rx.recv()?, (false, 2));
    Ok(())
}

#[tokio::test]
async fn fetch_unprocessed_filters_by_market_and_skips_processed_rows() -> Result<()> {
    let (_dir, staging, _pool) = staging_fixture().await?;
    let ids = IdGenerator::new(1)?;

    let tenda = StagedProduct::new(&ids, "Arroz", "Tenda", 100, Utc::now())?;
    let marche = StagedProduct::new(&ids, "Feijao", "StMarche", 200, Utc::now())?;
    staging.insert_products(&[tenda.clone(), marche]).await?;

    let all = staging.fetch_unprocessed(None, 0).await?;
    assert_eq!(all.len(), 2);

    let only_tenda = staging.fetch_unprocessed(Some("Tenda"), 0).await?;
    assert_eq!(only_tenda.len(), 1);
    assert_eq!(only_tenda[0].name, "Arroz");
    // Round-tripped rows keep their values.
    assert_eq!(only_tenda[0].id, tenda.id);
    assert_eq!(only_tenda[0].price, 100);
    assert!(only_tenda[0].created_at.is_some());

    staging.mark_processed(tenda.id).await?;
    let remaining = staging.fetch_unprocessed(None, 0).await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Feijao");
    Ok(())
}
