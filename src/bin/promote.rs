//! Promote staged rows into the normalized price catalog.
//!
//! Usage: `promote [market]` — an optional market name narrows the run to
//! that source's staged rows.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use mercado_etl::application::promotion::PromotionEngine;
use mercado_etl::infrastructure::catalog_repository::CatalogRepository;
use mercado_etl::infrastructure::config::AppConfig;
use mercado_etl::infrastructure::database_connection::DatabaseConnection;
use mercado_etl::infrastructure::logging::init_logging;
use mercado_etl::infrastructure::staging_repository::StagingRepository;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = AppConfig::load()?;
    let market = std::env::args().nth(1);

    let db = DatabaseConnection::new(&config.database_url).await?;
    db.migrate().await?;
    let pool = Arc::new(db.pool().clone());

    let engine = PromotionEngine::new(
        StagingRepository::new(Arc::clone(&pool)),
        CatalogRepository::new(pool),
        config.promotion_batch_limit,
    );

    let summary = engine.run(market.as_deref()).await?;
    info!(
        promoted = summary.rows_promoted,
        failed = summary.rows_failed,
        "promotion complete"
    );
    Ok(())
}
