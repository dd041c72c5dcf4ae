use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::{ServiceType, UrgencyLevel};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub service: ServiceType,
    pub base_price: Decimal,
    /// Base price with the urgency factor applied.
    pub adjusted_price: Decimal,
}

/// A fully derived price for the active service set. Always recomputed from
/// the complete set; never patched incrementally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub urgency: UrgencyLevel,
    pub subtotal: Decimal,
    pub discount_rate: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
}

impl Quote {
    pub fn savings(&self) -> Decimal {
        self.discount_total
    }
}
