//! Application layer
//!
//! The market extraction contract and its per-site implementations, the
//! scrape run driver, and the staging-to-catalog promotion engine.

pub mod extractor;
pub mod markets;
pub mod promotion;
pub mod scrape_runner;

pub use extractor::{Category, MarketExtractor, ProductPage};
pub use promotion::{PromotionEngine, PromotionSummary};
pub use scrape_runner::{RunSummary, ScrapeRunner};
