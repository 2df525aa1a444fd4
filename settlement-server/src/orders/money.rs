//! Money calculation utilities using rust_decimal for precision
//!
//! All amounts are `Decimal` rounded to 2 decimal places, half away from zero.

use rust_decimal::prelude::*;
use shared::util::round_money;

/// Maximum allowed quantity per line
pub const MAX_QUANTITY: u32 = 9999;

/// Line subtotal: `quantity × unit_price`
pub fn line_subtotal(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// Split an order amount into `(commission, net)`
///
/// `commission = round(amount × rate)`, `net = amount − commission`, so the
/// two always add back up to the amount.
pub fn commission_split(amount: Decimal, rate: Decimal) -> (Decimal, Decimal) {
    let commission = round_money(amount * rate);
    (commission, amount - commission)
}

/// Loyalty points for an order: `amount × rate`, half-up to a whole point
pub fn loyalty_points(amount: Decimal, rate: Decimal) -> i64 {
    (amount * rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
        .max(0)
}

/// Subtract discounts from a subtotal, never below zero
pub fn apply_discount(subtotal: Decimal, discount: Decimal) -> Decimal {
    round_money((subtotal - discount).max(Decimal::ZERO))
}
