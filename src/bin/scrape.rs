//! Scrape one or all markets into the staging store.
//!
//! Usage: `scrape [tenda|marche|all]` (default `all`).

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::error;

use mercado_etl::application::extractor::MarketExtractor;
use mercado_etl::application::markets::{MarcheMarket, TendaMarket};
use mercado_etl::application::scrape_runner::ScrapeRunner;
use mercado_etl::domain::identifier::IdGenerator;
use mercado_etl::infrastructure::config::AppConfig;
use mercado_etl::infrastructure::database_connection::DatabaseConnection;
use mercado_etl::infrastructure::logging::init_logging;
use mercado_etl::infrastructure::staging_repository::StagingRepository;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = AppConfig::load()?;
    let market_arg = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "all".to_string())
        .to_lowercase();

    let db = DatabaseConnection::new(&config.database_url).await?;
    db.migrate().await?;
    let staging = StagingRepository::new(Arc::new(db.pool().clone()));

    let ids = Arc::new(IdGenerator::new(config.machine_id)?);
    let extraction_date = Utc::now();

    let extractors: Vec<Box<dyn MarketExtractor>> = match market_arg.as_str() {
        "tenda" => vec![Box::new(TendaMarket::new(
            &config.markets.tenda,
            &config.http,
            Arc::clone(&ids),
            extraction_date,
        )?)],
        "marche" | "stmarche" => vec![Box::new(MarcheMarket::new(
            &config.markets.marche,
            &config.http,
            Arc::clone(&ids),
            extraction_date,
        )?)],
        "all" => vec![
            Box::new(TendaMarket::new(
                &config.markets.tenda,
                &config.http,
                Arc::clone(&ids),
                extraction_date,
            )?),
            Box::new(MarcheMarket::new(
                &config.markets.marche,
                &config.http,
                Arc::clone(&ids),
                extraction_date,
            )?),
        ],
        other => bail!("unknown market '{other}' (expected tenda, marche, or all)"),
    };

    let runner = ScrapeRunner::new(staging, config.export_dir.clone());

    let mut failures = 0usize;
    for extractor in &extractors {
        if let Err(e) = runner.run(extractor.as_ref()).await {
            error!(market = extractor.market(), "scrape run failed: {e:#}");
            failures += 1;
        }
    }

    if failures == extractors.len() {
        bail!("every market failed");
    }
    Ok(())
}
