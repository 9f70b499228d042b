//! Infrastructure layer
//!
//! Configuration, logging, HTTP fetching, the SQLite connection and schema,
//! and the repositories the application layer builds on.

pub mod catalog_repository;
pub mod config;
pub mod database_connection;
pub mod file_export;
pub mod http_client;
pub mod logging;
pub mod staging_repository;

pub use catalog_repository::{CatalogRepository, DedupMaps};
pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use http_client::HttpClient;
pub use staging_repository::{StagingRepository, StoreError, StoreResult};
