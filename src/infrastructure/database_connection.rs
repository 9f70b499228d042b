//! Database connection and pool management
//!
//! SQLite via sqlx. One pool serves both the staging tables and the
//! normalized catalog; `migrate()` creates the schema idempotently.
//!
//! Quantities are stored as TEXT and parsed back through `rust_decimal` so
//! exactness survives the round trip (sqlite has no decimal type).

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS stage_scraping_products (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                market TEXT NOT NULL,
                category TEXT,
                brand TEXT,
                product_url TEXT,
                source_id TEXT,
                price INTEGER NOT NULL,
                quantity TEXT,
                unit_of_measure TEXT,
                extraction_url TEXT,
                extraction_date DATETIME NOT NULL,
                currency TEXT,
                is_processed BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS stage_discounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                discounted_price INTEGER NOT NULL,
                conditions_text TEXT,
                conditions_min_quantity INTEGER,
                conditions_buy_quantity INTEGER,
                conditions_get_quantity INTEGER,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS supermarkets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS brands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL UNIQUE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL UNIQUE,
                quantity TEXT,
                id_brand INTEGER REFERENCES brands (id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS raw_product_data (
                product_id INTEGER NOT NULL REFERENCES products (id),
                original_name TEXT NOT NULL,
                product_url TEXT NOT NULL UNIQUE,
                extraction_date DATETIME NOT NULL,
                market TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                id_supermarket INTEGER NOT NULL REFERENCES supermarkets (id),
                id_product INTEGER NOT NULL REFERENCES products (id),
                extraction_date DATETIME NOT NULL,
                value INTEGER NOT NULL,
                currency TEXT,
                UNIQUE (id_supermarket, id_product, extraction_date)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS discounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                id_price INTEGER NOT NULL REFERENCES prices (id),
                unit_value INTEGER NOT NULL,
                condition_type TEXT NOT NULL,
                min_qty INTEGER,
                multiple_qty INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_stage_products_processed
                ON stage_scraping_products (is_processed, market)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_stage_discounts_product
                ON stage_discounts (product_id)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
