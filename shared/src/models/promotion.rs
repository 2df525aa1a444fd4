//! Promotion codes and redemption records

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `discount_value` is a percentage (0-100)
    Percentage,
    /// `discount_value` is an absolute amount
    FixedAmount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionStatus {
    #[default]
    Active,
    Inactive,
    Expired,
}

/// Promotion (discount code)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promotion {
    pub id: String,
    /// Unique, case-sensitive code
    pub code: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_order_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discount_amount: Option<Decimal>,
    /// Validity window start (Unix millis, inclusive)
    pub start_date: i64,
    /// Validity window end (Unix millis, inclusive)
    pub end_date: i64,
    /// `None` = unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u32>,
    /// `None` = unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_customer_limit: Option<u32>,
    /// Always equals the number of redemption rows
    pub usage_count: u32,
    pub status: PromotionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Promotion {
    pub fn is_within_window(&self, now: i64) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    /// Global slots left, `None` = unlimited
    pub fn remaining_uses(&self) -> Option<u32> {
        self.usage_limit
            .map(|limit| limit.saturating_sub(self.usage_count))
    }
}

/// One successful application of a promotion to one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionRedemption {
    pub id: String,
    pub promotion_code: String,
    pub customer_id: String,
    pub order_id: String,
    /// Order amount the discount was computed against
    pub order_amount: Decimal,
    pub discount_amount: Decimal,
    pub redeemed_at: i64,
}
