//! Store, store-product (inventory) and cart models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Store owned by a supplier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Store {
    pub id: String,
    pub supplier_id: String,
    pub name: String,
    pub created_at: i64,
}

/// Product listed by a store, carrying its own stock counter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreProduct {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub stock: u32,
    pub is_active: bool,
    /// Listing end (Unix millis), `None` = never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

impl StoreProduct {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Active and not expired (stock is checked separately)
    pub fn is_available(&self, now: i64) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

/// One line in a per-store cart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartLine {
    pub store_product_id: String,
    pub quantity: u32,
    /// Price seen by the customer when the line was last validated
    pub unit_price: Decimal,
    pub amount: Decimal,
}

/// Per-customer, per-store cart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cart {
    pub id: String,
    pub customer_id: String,
    pub store_id: String,
    #[serde(default)]
    pub lines: Vec<CartLine>,
    pub updated_at: i64,
}

impl Cart {
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| l.amount).sum()
    }
}
