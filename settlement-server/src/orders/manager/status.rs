//! Status transitions, reversal and payment callbacks

use redb::WriteTransaction;
use shared::models::{Order, OrderStatus, PaymentStatus, RequestKind, ReviewStatus, Shipment};
use shared::util::new_id;

use super::{Effects, OrdersManager};
use crate::auth::{Actor, Role};
use crate::core::error::{SettlementError, SettlementResult};
use crate::orders::money;
use crate::services::NotificationKind;

/// Extra data carried by a transition
#[derive(Debug, Clone, Default)]
pub(crate) struct TransitionContext {
    pub reason: Option<String>,
    /// Count a cancellation against the customer
    pub customer_fault: bool,
    pub tracking_code: Option<String>,
}

impl OrdersManager {
    /// Move an order to `target` (supplier of the order, admin or system)
    ///
    /// `RETURNED` is only reachable through an approved review request.
    pub fn update_status(
        &self,
        actor: &Actor,
        order_id: &str,
        target: OrderStatus,
    ) -> SettlementResult<Order> {
        self.supplier_transition(actor, order_id, target, TransitionContext::default())
    }

    /// Start shipping with an optional carrier tracking code
    pub fn ship_order(
        &self,
        actor: &Actor,
        order_id: &str,
        tracking_code: Option<String>,
    ) -> SettlementResult<Order> {
        let ctx = TransitionContext {
            tracking_code,
            ..Default::default()
        };
        self.supplier_transition(actor, order_id, OrderStatus::Shipping, ctx)
    }

    /// Customer self-service cancellation before shipping
    ///
    /// Cancelling after the supplier confirmed counts as a customer fault.
    pub fn cancel_order(
        &self,
        actor: &Actor,
        order_id: &str,
        reason: Option<String>,
    ) -> SettlementResult<Order> {
        let txn = self.storage.begin_write()?;
        let mut order = self.load_order_txn(&txn, order_id)?;
        actor.require_customer(&order.customer_id)?;
        if !order.status.is_pre_shipping() {
            return Err(SettlementError::transition(order.status, OrderStatus::Canceled));
        }

        let ctx = TransitionContext {
            customer_fault: order.status != OrderStatus::Pending,
            reason,
            ..Default::default()
        };
        let mut effects = Effects::default();
        self.apply_transition_txn(&txn, &mut order, OrderStatus::Canceled, &ctx, &mut effects)?;
        effects.notify(
            &order.supplier_id,
            NotificationKind::OrderStatusChanged,
            format!("Order {} was canceled by the customer", order.code),
            &order.id,
        );
        txn.commit()?;

        tracing::info!(order_id = %order_id, customer_fault = ctx.customer_fault, "Order canceled by customer");
        self.dispatch_effects(effects)?;
        self.refresh(order)
    }

    /// Gateway callback for the checkout payment (system / admin)
    ///
    /// A payment captured after the order was already reversed is refunded
    /// right away.
    pub fn record_payment_result(
        &self,
        actor: &Actor,
        order_id: &str,
        succeeded: bool,
        error: Option<String>,
    ) -> SettlementResult<Order> {
        actor.require_privileged()?;
        let now = self.now();
        let txn = self.storage.begin_write()?;
        let mut order = self.load_order_txn(&txn, order_id)?;
        let payment_id = order
            .payment_id
            .clone()
            .ok_or_else(|| SettlementError::PaymentNotFound(order_id.to_string()))?;
        let mut payment = self
            .storage
            .get_payment_txn(&txn, &payment_id)?
            .ok_or_else(|| SettlementError::PaymentNotFound(payment_id.clone()))?;

        if !matches!(payment.status, PaymentStatus::Pending | PaymentStatus::Failed) {
            return Err(SettlementError::InvalidRefundState(format!(
                "payment {} already {:?}",
                payment_id, payment.status
            )));
        }

        let mut effects = Effects::default();
        payment.status = match (succeeded, order.status.is_reversal()) {
            (true, false) => PaymentStatus::Succeeded,
            (true, true) => {
                tracing::warn!(order_id = %order_id, status = %order.status, "Payment captured on reversed order, refunding");
                effects.refund = Some((order.id.clone(), payment_id.clone()));
                PaymentStatus::RefundPending
            }
            (false, _) => PaymentStatus::Failed,
        };
        payment.last_error = if succeeded { None } else { error };
        payment.updated_at = now;
        order.payment_status = payment.status;
        order.updated_at = now;
        self.storage.store_payment(&txn, &payment)?;
        self.storage.store_order(&txn, &order)?;
        txn.commit()?;

        tracing::info!(order_id = %order_id, payment_status = ?payment.status, "Payment result recorded");
        self.dispatch_effects(effects)?;
        self.refresh(order)
    }

    /// Replay a refund that failed at the gateway (admin / system)
    pub fn retry_refund(&self, actor: &Actor, order_id: &str) -> SettlementResult<Order> {
        actor.require_privileged()?;
        let order = self
            .storage
            .get_order(order_id)?
            .ok_or_else(|| SettlementError::OrderNotFound(order_id.to_string()))?;
        if order.payment_status != PaymentStatus::RefundPending {
            return Err(SettlementError::InvalidRefundState(format!(
                "order {} payment is {:?}",
                order_id, order.payment_status
            )));
        }
        let payment_id = order
            .payment_id
            .clone()
            .ok_or_else(|| SettlementError::PaymentNotFound(order_id.to_string()))?;

        tracing::info!(order_id = %order_id, payment_id = %payment_id, "Retrying refund");
        self.execute_refund(order_id, &payment_id)?;
        self.refresh(order)
    }

    fn supplier_transition(
        &self,
        actor: &Actor,
        order_id: &str,
        target: OrderStatus,
        ctx: TransitionContext,
    ) -> SettlementResult<Order> {
        if actor.role == Role::Customer {
            return Err(SettlementError::UnauthorizedAccess(
                "customers cancel through cancel_order".to_string(),
            ));
        }
        if target == OrderStatus::Returned {
            return Err(SettlementError::UnauthorizedAccess(
                "returns require an approved review request".to_string(),
            ));
        }

        let txn = self.storage.begin_write()?;
        let mut order = self.load_order_txn(&txn, order_id)?;
        actor.require_order_supplier(&order)?;

        let mut effects = Effects::default();
        let from = order.status;
        self.apply_transition_txn(&txn, &mut order, target, &ctx, &mut effects)?;
        txn.commit()?;

        tracing::info!(order_id = %order_id, from = %from, to = %target, actor = %actor.user_id, "Order status updated");
        self.dispatch_effects(effects)?;
        self.refresh(order)
    }

    pub(crate) fn load_order_txn(&self, txn: &WriteTransaction, order_id: &str) -> SettlementResult<Order> {
        self.storage
            .get_order_txn(txn, order_id)?
            .ok_or_else(|| SettlementError::OrderNotFound(order_id.to_string()))
    }

    /// Latest committed copy (post-commit effects may have changed it)
    pub(crate) fn refresh(&self, order: Order) -> SettlementResult<Order> {
        Ok(self.storage.get_order(&order.id)?.unwrap_or(order))
    }

    /// Validate and apply one transition inside `txn`
    ///
    /// Leaves the order untouched when the transition is not in the allow-list.
    pub(crate) fn apply_transition_txn(
        &self,
        txn: &WriteTransaction,
        order: &mut Order,
        target: OrderStatus,
        ctx: &TransitionContext,
        effects: &mut Effects,
    ) -> SettlementResult<()> {
        if !order.status.can_transition_to(target) {
            tracing::debug!(order_id = %order.id, from = %order.status, to = %target, allowed = ?order.status.allowed_next(), "Transition rejected");
            return Err(SettlementError::transition(order.status, target));
        }
        let now = self.now();

        match target {
            OrderStatus::Shipping => {
                let shipment = Shipment {
                    id: new_id(),
                    order_id: order.id.clone(),
                    tracking_code: ctx.tracking_code.clone(),
                    shipped_at: now,
                    delivered_at: None,
                };
                self.storage.store_shipment(txn, &shipment)?;
                order.shipment_id = Some(shipment.id);
            }
            OrderStatus::Delivered => self.deliver_txn(txn, order, now, effects)?,
            OrderStatus::Canceled | OrderStatus::Returned => {
                self.reverse_txn(txn, order, now, effects)?;
                self.close_open_requests_txn(txn, order, target, now, effects)?;
                order.cancel_reason = ctx.reason.clone();
                if ctx.customer_fault {
                    order.customer_fault = true;
                    effects.fault = Some(order.customer_id.clone());
                }
            }
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing => {}
        }

        order.status = target;
        order.updated_at = now;
        self.storage.store_order(txn, order)?;
        effects.notify(
            &order.customer_id,
            NotificationKind::OrderStatusChanged,
            format!("Order {} is now {}", order.code, target),
            &order.id,
        );
        Ok(())
    }

    /// DELIVERED: stamp shipment, credit wallet, award points
    fn deliver_txn(
        &self,
        txn: &WriteTransaction,
        order: &mut Order,
        now: i64,
        effects: &mut Effects,
    ) -> SettlementResult<()> {
        order.delivered_at = Some(now);
        if let Some(shipment_id) = &order.shipment_id
            && let Some(mut shipment) = self.storage.get_shipment_txn(txn, shipment_id)?
        {
            shipment.delivered_at = Some(now);
            self.storage.store_shipment(txn, &shipment)?;
        }

        let settlement = self.wallets.credit_order_txn(txn, order, now)?;
        effects.notify(
            &order.supplier_id,
            NotificationKind::WalletUpdated,
            format!("{} credited for order {}", settlement.net_amount, order.code),
            &order.id,
        );
        order.settlement = Some(settlement);

        let points = money::loyalty_points(order.total_amount, self.settings.loyalty_points_rate);
        if points > 0 {
            let balance = self.storage.add_loyalty_points(txn, &order.customer_id, points)?;
            tracing::debug!(customer_id = %order.customer_id, points, balance, "Loyalty points awarded");
        }
        order.loyalty_points_awarded = points;
        Ok(())
    }

    /// Reject review requests still open on an order that just became terminal
    ///
    /// A request being approved clears its own index row first, so it is not
    /// seen here.
    fn close_open_requests_txn(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        target: OrderStatus,
        now: i64,
        effects: &mut Effects,
    ) -> SettlementResult<()> {
        for kind in [RequestKind::Cancellation, RequestKind::Return] {
            let Some(request_id) = self.storage.get_open_request_txn(txn, &order.id, kind)? else {
                continue;
            };
            self.storage.clear_open_request(txn, &order.id, kind)?;
            let Some(mut request) = self.storage.get_request_txn(txn, &request_id)? else {
                tracing::warn!(order_id = %order.id, request_id = %request_id, "Open request index points at a missing request");
                continue;
            };
            if request.status.is_decided() {
                continue;
            }

            request.status = ReviewStatus::Rejected;
            request.review_note = Some(format!("Superseded by order status {target}"));
            request.reviewed_at = Some(now);
            self.storage.store_request(txn, &request)?;
            tracing::info!(order_id = %order.id, request_id = %request_id, kind = ?kind, to = %target, "Open review request superseded");
            effects.notify(
                &request.customer_id,
                NotificationKind::RequestReviewed,
                format!(
                    "Your {} request for order {} was closed: order is now {}",
                    kind.as_str(),
                    order.code,
                    target
                ),
                &order.id,
            );
        }
        Ok(())
    }

    /// CANCELED / RETURNED: undo everything checkout and delivery did
    fn reverse_txn(
        &self,
        txn: &WriteTransaction,
        order: &mut Order,
        now: i64,
        effects: &mut Effects,
    ) -> SettlementResult<()> {
        for line in self.storage.get_order_lines_txn(txn, &order.id)? {
            self.inventory
                .restore_txn(txn, &line.store_product_id, line.quantity, now)?;
        }

        for code in &order.promotion_codes {
            if !self
                .promotions
                .rollback_txn(txn, code, &order.customer_id, &order.id, now)?
            {
                tracing::warn!(order_id = %order.id, code = %code, "No redemption to roll back");
            }
        }

        if let Some(debit) = self.wallets.debit_order_txn(txn, order, now)? {
            effects.notify(
                &order.supplier_id,
                NotificationKind::WalletUpdated,
                format!("{} debited for reversed order {}", debit.net_amount, order.code),
                &order.id,
            );
        }

        if order.loyalty_points_awarded > 0 {
            self.storage
                .add_loyalty_points(txn, &order.customer_id, -order.loyalty_points_awarded)?;
            order.loyalty_points_awarded = 0;
        }

        if order.payment_status == PaymentStatus::Succeeded
            && let Some(payment_id) = order.payment_id.clone()
        {
            let mut payment = self
                .storage
                .get_payment_txn(txn, &payment_id)?
                .ok_or_else(|| SettlementError::PaymentNotFound(payment_id.clone()))?;
            payment.status = PaymentStatus::RefundPending;
            payment.updated_at = now;
            self.storage.store_payment(txn, &payment)?;
            order.payment_status = PaymentStatus::RefundPending;
            effects.refund = Some((order.id.clone(), payment_id));
        }
        Ok(())
    }
}
