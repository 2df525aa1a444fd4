//! Checkout: cart → order in one write transaction
//!
//! ```text
//! checkout(actor, request)
//!     ├─ 1. Load cart and store, check ownership
//!     ├─ 2. Reserve stock per line at the live catalog price
//!     ├─ 3. Redeem promotion codes against the running amount
//!     ├─ 4. Allocate order code, create pending payment
//!     ├─ 5. Persist order + frozen lines, delete the cart
//!     └─ 6. Commit, notify supplier
//! ```
//!
//! Any failure drops the transaction, so nothing of the above is kept.

use std::collections::HashSet;

use rust_decimal::Decimal;
use shared::models::{
    Order, OrderLineItem, OrderStatus, Payment, PaymentStatus, PromotionRedemption,
    ShippingAddress,
};
use shared::util::new_id;

use super::{Effects, OrdersManager};
use crate::auth::Actor;
use crate::core::error::{SettlementError, SettlementResult};
use crate::orders::money;
use crate::services::NotificationKind;
use crate::utils::time::business_date;

/// Order code prefix, followed by the business date and a daily counter
const ORDER_CODE_PREFIX: &str = "ORD";
/// Daily counter offset, keeps codes fixed-width for the first 90,000 orders
const ORDER_CODE_BASE: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub cart_id: String,
    pub shipping_address: ShippingAddress,
    /// Applied in order, each against the amount left by the previous one
    pub promotion_codes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub lines: Vec<OrderLineItem>,
    pub payment: Payment,
    pub redemptions: Vec<PromotionRedemption>,
}

fn validate_address(address: &ShippingAddress) -> SettlementResult<()> {
    for (field, value) in [
        ("recipient", &address.recipient),
        ("phone", &address.phone),
        ("line1", &address.line1),
        ("city", &address.city),
    ] {
        if value.trim().is_empty() {
            return Err(SettlementError::InvalidInput(format!(
                "shipping address {field} is required"
            )));
        }
    }
    Ok(())
}

impl OrdersManager {
    pub fn checkout(&self, actor: &Actor, request: CheckoutRequest) -> SettlementResult<CheckoutOutcome> {
        validate_address(&request.shipping_address)?;
        let mut seen = HashSet::new();
        if let Some(dup) = request.promotion_codes.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(SettlementError::InvalidInput(format!(
                "promotion code {dup} given more than once"
            )));
        }

        let now = self.now();
        let txn = self.storage.begin_write()?;

        // 1. Cart and store
        let cart = self
            .storage
            .get_cart_txn(&txn, &request.cart_id)?
            .ok_or_else(|| SettlementError::CartNotFound(request.cart_id.clone()))?;
        actor.require_customer(&cart.customer_id)?;
        if cart.lines.is_empty() {
            return Err(SettlementError::EmptyCart);
        }
        let store = self
            .storage
            .get_store_txn(&txn, &cart.store_id)?
            .ok_or_else(|| SettlementError::StoreNotFound(cart.store_id.clone()))?;

        // 2. Reserve stock, freeze lines
        let order_id = new_id();
        let mut lines = Vec::with_capacity(cart.lines.len());
        let mut subtotal = Decimal::ZERO;
        for (line_no, cart_line) in (1u32..).zip(cart.lines.iter()) {
            if cart_line.quantity > money::MAX_QUANTITY {
                return Err(SettlementError::InvalidInput(format!(
                    "quantity {} exceeds maximum {}",
                    cart_line.quantity,
                    money::MAX_QUANTITY
                )));
            }
            let product = self.inventory.reserve_txn(
                &txn,
                &cart_line.store_product_id,
                cart_line.quantity,
                now,
            )?;
            if product.store_id != store.id {
                return Err(SettlementError::ProductUnavailable(product.id));
            }
            let line_subtotal = money::line_subtotal(product.unit_price, cart_line.quantity);
            subtotal += line_subtotal;
            lines.push(OrderLineItem {
                order_id: order_id.clone(),
                line_no,
                store_product_id: product.id,
                product_name: product.name,
                quantity: cart_line.quantity,
                unit_price: product.unit_price,
                subtotal: line_subtotal,
            });
        }

        // 3. Promotions
        let mut total = subtotal;
        let mut redemptions = Vec::with_capacity(request.promotion_codes.len());
        for code in &request.promotion_codes {
            let redemption = self.promotions.redeem_txn(
                &txn,
                code,
                &cart.customer_id,
                &order_id,
                total,
                now,
            )?;
            total = money::apply_discount(total, redemption.discount_amount);
            redemptions.push(redemption);
        }

        // 4. Code and payment
        let day = business_date(now, self.settings.timezone).format("%Y%m%d").to_string();
        let seq = self
            .storage
            .increment_sequence_txn(&txn, &format!("order_code:{day}"))?;
        let code = format!("{ORDER_CODE_PREFIX}{day}{}", ORDER_CODE_BASE + seq);
        if !self.storage.register_order_code(&txn, &code, &order_id)? {
            return Err(SettlementError::AlreadyExists(format!("order code {code}")));
        }

        let payment = Payment {
            id: new_id(),
            order_id: order_id.clone(),
            amount: total,
            status: PaymentStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        // 5. Persist
        let order = Order {
            id: order_id,
            code,
            customer_id: cart.customer_id.clone(),
            store_id: store.id.clone(),
            supplier_id: store.supplier_id.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal,
            discount_amount: subtotal - total,
            total_amount: total,
            shipping_address: request.shipping_address,
            promotion_codes: request.promotion_codes,
            payment_id: Some(payment.id.clone()),
            shipment_id: None,
            settlement: None,
            loyalty_points_awarded: 0,
            customer_fault: false,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        };
        for line in &lines {
            self.storage.store_order_line(&txn, line)?;
        }
        self.storage.store_payment(&txn, &payment)?;
        self.storage.store_order(&txn, &order)?;
        self.storage.delete_cart(&txn, &cart)?;
        txn.commit()?;

        tracing::info!(
            order_id = %order.id,
            code = %order.code,
            customer_id = %order.customer_id,
            lines = lines.len(),
            subtotal = %order.subtotal,
            discount = %order.discount_amount,
            total = %order.total_amount,
            "Checkout completed"
        );

        let mut effects = Effects::default();
        effects.notify(
            &order.supplier_id,
            NotificationKind::NewOrder,
            format!("New order {} ({})", order.code, order.total_amount),
            &order.id,
        );
        self.dispatch_effects(effects)?;

        Ok(CheckoutOutcome {
            order,
            lines,
            payment,
            redemptions,
        })
    }
}
