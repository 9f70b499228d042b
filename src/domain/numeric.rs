//! Locale-aware numeric parsing for scraped price and quantity text
//!
//! Market pages mix Brazilian/European formatting ("R$ 1.234,56") with plain
//! US-style decimals ("13.65"). Everything extracted from markup is routed
//! through these functions before landing on a staged product; raw price
//! text is never persisted.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::domain::error::{DomainError, DomainResult};

/// Parse free-form price/quantity text into an exact decimal.
///
/// Rules:
/// - `None` or blank input yields zero.
/// - Every character except digits, comma and dot is stripped first.
/// - When both separators appear, the one closest to the end of the string
///   is the decimal point and everything before it is a thousands separator.
/// - A lone comma is a decimal point; a lone dot is kept as-is (US format).
///
/// Returns [`DomainError::InvalidNumericFormat`] when a non-blank input
/// yields no digits, or the cleaned text still fails to parse.
pub fn parse_decimal(input: Option<&str>) -> DomainResult<Decimal> {
    let Some(raw) = input else {
        return Ok(Decimal::ZERO);
    };
    if raw.trim().is_empty() {
        return Ok(Decimal::ZERO);
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return Err(DomainError::InvalidNumericFormat(raw.to_string()));
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => {
            // European format: "1.234.567,89" -> "1234567.89"
            let (integer, fraction) = cleaned.split_at(comma);
            format!("{}.{}", integer.replace(['.', ','], ""), &fraction[1..])
        }
        // US format with thousands separators: "1,234,567.89"
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        // Only a comma: decimal separator.
        (Some(_), None) => cleaned.replace(',', "."),
        // Only dots, or digits alone: already US format.
        _ => cleaned,
    };

    Decimal::from_str(&normalized)
        .map_err(|_| DomainError::InvalidNumericFormat(raw.to_string()))
}

/// Parse price text into integer minor currency units (cents).
///
/// The parsed decimal is scaled by 100 and truncated toward zero, matching
/// the staging contract: exactly two decimal places survive, anything
/// beyond is discarded rather than rounded.
pub fn price_to_minor_units(input: Option<&str>) -> DomainResult<i64> {
    let value = parse_decimal(input)?;
    decimal_to_minor_units(value)
        .ok_or_else(|| DomainError::InvalidNumericFormat(input.unwrap_or_default().to_string()))
}

/// Scale an already-parsed decimal into minor currency units.
///
/// Used for API payloads that carry numeric prices directly.
pub fn decimal_to_minor_units(value: Decimal) -> Option<i64> {
    (value * Decimal::ONE_HUNDRED).trunc().to_i64()
}

/// Normalize a display word into its canonical dedup form.
///
/// Lowercases, strips accents (NFD, combining marks removed), drops every
/// character outside `[a-z0-9 ]`, collapses runs of whitespace and
/// capitalizes the first letter: `"  LEITE   Integral® "` -> `"Leite integral"`.
pub fn normalize_word(word: &str) -> String {
    let filtered: String = word
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | ' ' | '\t' | '\n'))
        .collect();

    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => collapsed,
    }
}
