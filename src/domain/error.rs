//! Domain error taxonomy
//!
//! Failures that originate in pure business logic. I/O-level failures live
//! with the repositories (`StoreError`) and the HTTP client.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The input contained no usable digits after cleaning, or the cleaned
    /// text still did not form a valid number.
    #[error("cannot convert '{0}' to a valid number")]
    InvalidNumericFormat(String),

    /// The wall clock moved backwards relative to the last issued id. The
    /// generator refuses to mint an id that could duplicate or reorder.
    #[error("clock moved backwards; refusing to generate id")]
    ClockRegression,

    /// Generator machine tag outside the 10-bit range.
    #[error("machine id must be between 0 and 1023, got {0}")]
    InvalidMachineId(u16),
}

pub type DomainResult<T> = Result<T, DomainError>;
