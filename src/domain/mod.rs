//! Domain module - core business logic and entities
//!
//! Pure logic only: numeric/word normalization, id allocation, the staged
//! product/discount model and the normalized catalog entities. No I/O.

pub mod discount;
pub mod entities;
pub mod error;
pub mod identifier;
pub mod numeric;
pub mod product;

pub use discount::{DiscountType, StagedDiscount};
pub use error::{DomainError, DomainResult};
pub use identifier::IdGenerator;
pub use product::StagedProduct;
