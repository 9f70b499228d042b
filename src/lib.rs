//! Supermarket price ETL: scrape storefront listings into a staging store,
//! then promote staged rows into a normalized price catalog.
//!
//! The pipeline has two halves, each with its own binary:
//!
//! - `scrape` walks a market's categories, stages every listed product with
//!   its discounts, and exports each batch to a JSON file.
//! - `promote` converts unprocessed staged rows into deduplicated
//!   supermarkets, brands, products, prices, and discounts.

pub mod application;
pub mod domain;
pub mod infrastructure;
