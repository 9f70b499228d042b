//! Staged discount records
//!
//! Each discount belongs to exactly one staged product and carries only the
//! condition fields relevant to its kind; the rest stay unset. The wire
//! strings of [`DiscountType`] are persisted verbatim in the staging store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discount kinds observed across market sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountType {
    /// Percentage off from the Nth unit ("-40% na 2ª unidade").
    #[serde(rename = "PERCENTAGE_QUANTITY")]
    PercentageQuantity,
    /// Store-card price.
    #[serde(rename = "CARD")]
    Card,
    /// Tiered price from a minimum quantity ("a partir de X unidades").
    #[serde(rename = "WHOLESALE")]
    Wholesale,
    /// Take X+Y, pay X ("2x1", "3x2").
    #[serde(rename = "BUY_X_GET_Y")]
    BuyXGetY,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PercentageQuantity => "PERCENTAGE_QUANTITY",
            Self::Card => "CARD",
            Self::Wholesale => "WHOLESALE",
            Self::BuyXGetY => "BUY_X_GET_Y",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PERCENTAGE_QUANTITY" => Some(Self::PercentageQuantity),
            "CARD" => Some(Self::Card),
            "WHOLESALE" => Some(Self::Wholesale),
            "BUY_X_GET_Y" => Some(Self::BuyXGetY),
            _ => None,
        }
    }
}

/// A staged discount row, owned by the staged product that produced it until
/// both are persisted. `product_id` is a back-reference filled in by
/// [`StagedProduct::add_discount`](crate::domain::product::StagedProduct::add_discount).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedDiscount {
    pub product_id: i64,
    pub discount_type: DiscountType,
    /// Minor currency units.
    pub discounted_price: i64,

    pub conditions_text: Option<String>,
    pub conditions_min_quantity: Option<i64>,
    pub conditions_buy_quantity: Option<i64>,
    pub conditions_get_quantity: Option<i64>,

    /// Database-assigned, absent until persisted.
    pub id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl StagedDiscount {
    fn base(discount_type: DiscountType, discounted_price: i64) -> Self {
        Self {
            product_id: 0,
            discount_type,
            discounted_price,
            conditions_text: None,
            conditions_min_quantity: None,
            conditions_buy_quantity: None,
            conditions_get_quantity: None,
            id: None,
            created_at: None,
        }
    }

    /// Percentage discount that applies from `min_quantity` units.
    pub fn percentage_quantity(
        discounted_price: i64,
        min_quantity: i64,
        conditions_text: Option<String>,
    ) -> Self {
        Self {
            conditions_text,
            conditions_min_quantity: Some(min_quantity),
            ..Self::base(DiscountType::PercentageQuantity, discounted_price)
        }
    }

    /// Store-card price.
    pub fn card(discounted_price: i64, conditions_text: Option<String>) -> Self {
        Self {
            conditions_text,
            ..Self::base(DiscountType::Card, discounted_price)
        }
    }

    /// Wholesale tier from `min_quantity` units.
    pub fn wholesale(
        discounted_price: i64,
        min_quantity: i64,
        conditions_text: Option<String>,
    ) -> Self {
        Self {
            conditions_text,
            conditions_min_quantity: Some(min_quantity),
            ..Self::base(DiscountType::Wholesale, discounted_price)
        }
    }

    /// Buy `buy_quantity`, get `get_quantity` extra.
    pub fn buy_x_get_y(
        discounted_price: i64,
        buy_quantity: i64,
        get_quantity: i64,
        conditions_text: Option<String>,
    ) -> Self {
        Self {
            conditions_text,
            conditions_buy_quantity: Some(buy_quantity),
            conditions_get_quantity: Some(get_quantity),
            ..Self::base(DiscountType::BuyXGetY, discounted_price)
        }
    }

    /// Field-ordered tuple form for bulk-insert parameter binding. Order
    /// matches the `stage_discounts` insert column list.
    pub fn to_tuple(
        &self,
    ) -> (
        i64,
        &'static str,
        i64,
        Option<&str>,
        Option<i64>,
        Option<i64>,
        Option<i64>,
    ) {
        (
            self.product_id,
            self.discount_type.as_str(),
            self.discounted_price,
            self.conditions_text.as_deref(),
            self.conditions_min_quantity,
            self.conditions_buy_quantity,
            self.conditions_get_quantity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_round_trip() {
        for kind in [
            DiscountType::PercentageQuantity,
            DiscountType::Card,
            DiscountType::Wholesale,
            DiscountType::BuyXGetY,
        ] {
            assert_eq!(DiscountType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DiscountType::parse("SOMETHING_ELSE"), None);

        let json = serde_json::to_string(&DiscountType::BuyXGetY).unwrap();
        assert_eq!(json, "\"BUY_X_GET_Y\"");
    }

    #[test]
    fn factories_populate_only_relevant_conditions() {
        let wholesale = StagedDiscount::wholesale(450, 6, None);
        assert_eq!(wholesale.discount_type, DiscountType::Wholesale);
        assert_eq!(wholesale.conditions_min_quantity, Some(6));
        assert!(wholesale.conditions_buy_quantity.is_none());
        assert!(wholesale.conditions_get_quantity.is_none());
        assert!(wholesale.conditions_text.is_none());

        let card = StagedDiscount::card(450, Some("com cartão".to_string()));
        assert!(card.conditions_min_quantity.is_none());
        assert_eq!(card.conditions_text.as_deref(), Some("com cartão"));

        let bogo = StagedDiscount::buy_x_get_y(900, 2, 1, None);
        assert_eq!(bogo.conditions_buy_quantity, Some(2));
        assert_eq!(bogo.conditions_get_quantity, Some(1));
        assert!(bogo.conditions_min_quantity.is_none());

        let pct = StagedDiscount::percentage_quantity(300, 2, None);
        assert_eq!(pct.conditions_min_quantity, Some(2));
        assert!(pct.conditions_buy_quantity.is_none());
    }

    #[test]
    fn tuple_form_matches_insert_order() {
        let mut discount = StagedDiscount::wholesale(450, 6, Some("atacado".to_string()));
        discount.product_id = 42;

        let tuple = discount.to_tuple();
        assert_eq!(tuple.0, 42);
        assert_eq!(tuple.1, "WHOLESALE");
        assert_eq!(tuple.2, 450);
        assert_eq!(tuple.3, Some("atacado"));
        assert_eq!(tuple.4, Some(6));
        assert_eq!(tuple.5, None);
        assert_eq!(tuple.6, None);
    }
}
