//! Per-market extractor implementations.

pub mod marche;
pub mod tenda;

pub use marche::MarcheMarket;
pub use tenda::TendaMarket;
