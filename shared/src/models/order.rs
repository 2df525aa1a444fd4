//! Order, order line and payment/shipment records

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Status
// ============================================================================

/// Order lifecycle status
///
/// ```text
/// PENDING → CONFIRMED → PREPARING → SHIPPING → DELIVERED
///    │          │            │          │           │
///    └──────────┴────────────┴→ CANCELED└→ RETURNED ←┘
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Shipping,
    Delivered,
    Canceled,
    Returned,
}

impl OrderStatus {
    /// Legal next states (strict allow-list)
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Canceled],
            Confirmed => &[Preparing, Canceled],
            Preparing => &[Shipping, Canceled],
            Shipping => &[Delivered, Returned],
            Delivered => &[Returned],
            Canceled | Returned => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Canceled | OrderStatus::Returned)
    }

    /// Reversal states restore stock, promotions and money
    pub fn is_reversal(&self) -> bool {
        self.is_terminal()
    }

    /// States in which the customer can still cancel without review
    pub fn is_pre_shipping(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Returned => "RETURNED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status (shared by the order and its payment record)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created at checkout, waiting for the gateway
    #[default]
    Pending,
    Succeeded,
    Failed,
    /// Order reversed, refund not yet confirmed by the gateway
    RefundPending,
    Refunded,
}

// ============================================================================
// Order
// ============================================================================

/// Shipping address snapshot taken at checkout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ShippingAddress {
    pub recipient: String,
    pub phone: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// Settlement recorded when the supplier wallet was credited for this order
///
/// Kept on the order so that a later reversal debits exactly what was credited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSettlement {
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub net_amount: Decimal,
    pub credited_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversed_at: Option<i64>,
}

/// Order header
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    /// Human-readable code, globally unique (e.g. `ORD2026101610001`)
    pub code: String,
    pub customer_id: String,
    pub store_id: String,
    /// Denormalized store owner, used for wallet routing and ownership checks
    pub supplier_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Sum of line subtotals
    pub subtotal: Decimal,
    /// Sum of promotion discounts
    pub discount_amount: Decimal,
    /// subtotal - discount_amount
    pub total_amount: Decimal,
    pub shipping_address: ShippingAddress,
    /// Promotion codes redeemed for this order (one redemption row each)
    #[serde(default)]
    pub promotion_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<OrderSettlement>,
    /// Loyalty points granted at delivery (revoked on return)
    #[serde(default)]
    pub loyalty_points_awarded: i64,
    /// Cancellation counted as a customer-fault violation
    #[serde(default)]
    pub customer_fault: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
}

/// Frozen order line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLineItem {
    pub order_id: String,
    pub line_no: u32,
    pub store_product_id: String,
    /// Product name snapshot
    pub product_name: String,
    pub quantity: u32,
    /// Unit price at checkout
    pub unit_price: Decimal,
    /// quantity × unit_price, never recomputed
    pub subtotal: Decimal,
}

// ============================================================================
// Payment / Shipment
// ============================================================================

/// Payment record created pending at checkout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Shipment record created when the order starts shipping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: String,
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<String>,
    pub shipped_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
}
