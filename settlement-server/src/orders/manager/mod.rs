//! OrdersManager - order state machine and its side effects
//!
//! Every command follows the same shape:
//!
//! ```text
//! command(actor, ...)
//!     ├─ 1. Begin write transaction (serializable, single writer)
//!     ├─ 2. Load order, check actor capability
//!     ├─ 3. Validate transition against the allow-list
//!     ├─ 4. Apply in-transaction effects
//!     │      stock / promotions / wallet / loyalty / payment status
//!     ├─ 5. Persist order, collect post-commit effects
//!     ├─ 6. Commit
//!     └─ 7. Dispatch effects (notifications, refund, reputation)
//! ```
//!
//! Post-commit effects never roll back committed state. A failed refund is
//! returned to the caller as retryable and can be replayed with
//! [`OrdersManager::retry_refund`].

mod checkout;
mod status;

#[cfg(test)]
pub(crate) mod tests;

pub use checkout::{CheckoutOutcome, CheckoutRequest};
pub(crate) use status::TransitionContext;

use std::sync::Arc;

use shared::models::{Order, OrderLineItem, Payment, PaymentStatus};

use crate::auth::Actor;
use crate::core::config::EngineSettings;
use crate::core::error::{SettlementError, SettlementResult};
use crate::inventory::InventoryLedger;
use crate::promotions::PromotionEngine;
use crate::services::notification::notify_best_effort;
use crate::services::{Collaborators, Notification, NotificationKind};
use crate::storage::SettlementStorage;
use crate::utils::Clock;
use crate::wallet::WalletLedger;

/// Work that may only happen after the transaction committed
#[derive(Debug, Default)]
pub(crate) struct Effects {
    notifications: Vec<Notification>,
    /// (order_id, payment_id) to refund through the gateway
    refund: Option<(String, String)>,
    /// Customer charged with a cancellation fault
    fault: Option<String>,
}

impl Effects {
    pub(crate) fn notify(
        &mut self,
        user_id: &str,
        kind: NotificationKind,
        message: String,
        order_id: &str,
    ) {
        self.notifications.push(Notification {
            user_id: user_id.to_string(),
            kind,
            message,
            link_url: Some(format!("/orders/{order_id}")),
        });
    }
}

/// Order state machine
#[derive(Clone)]
pub struct OrdersManager {
    storage: SettlementStorage,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    inventory: InventoryLedger,
    promotions: PromotionEngine,
    wallets: WalletLedger,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("settings", &self.settings)
            .field("collaborators", &self.collaborators)
            .finish_non_exhaustive()
    }
}

impl OrdersManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: SettlementStorage,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
        inventory: InventoryLedger,
        promotions: PromotionEngine,
        wallets: WalletLedger,
    ) -> Self {
        Self {
            storage,
            settings,
            clock,
            collaborators,
            inventory,
            promotions,
            wallets,
        }
    }

    pub fn storage(&self) -> &SettlementStorage {
        &self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    // ========== Queries ==========

    pub fn get_order(&self, actor: &Actor, order_id: &str) -> SettlementResult<Order> {
        let order = self
            .storage
            .get_order(order_id)?
            .ok_or_else(|| SettlementError::OrderNotFound(order_id.to_string()))?;
        actor.require_order_party(&order)?;
        Ok(order)
    }

    pub fn find_order_by_code(&self, actor: &Actor, code: &str) -> SettlementResult<Order> {
        let order_id = self
            .storage
            .find_order_by_code(code)?
            .ok_or_else(|| SettlementError::OrderNotFound(code.to_string()))?;
        self.get_order(actor, &order_id)
    }

    pub fn get_order_lines(&self, actor: &Actor, order_id: &str) -> SettlementResult<Vec<OrderLineItem>> {
        self.get_order(actor, order_id)?;
        Ok(self.storage.get_order_lines(order_id)?)
    }

    pub fn get_payment(&self, actor: &Actor, order_id: &str) -> SettlementResult<Payment> {
        let order = self.get_order(actor, order_id)?;
        let payment_id = order
            .payment_id
            .ok_or_else(|| SettlementError::PaymentNotFound(order_id.to_string()))?;
        self.storage
            .get_payment(&payment_id)?
            .ok_or(SettlementError::PaymentNotFound(payment_id))
    }

    // ========== Post-commit ==========

    /// Run effects collected by a committed transaction
    ///
    /// Only the refund can fail the call; notifications and reputation are
    /// best-effort.
    pub(crate) fn dispatch_effects(&self, effects: Effects) -> SettlementResult<()> {
        for notification in &effects.notifications {
            notify_best_effort(self.collaborators.notifier.as_ref(), notification);
        }

        if let Some(customer_id) = &effects.fault
            && let Err(e) = self
                .collaborators
                .reputation
                .record_cancellation_fault(customer_id)
        {
            tracing::warn!(customer_id = %customer_id, error = %e, "Failed to record cancellation fault");
        }

        if let Some((order_id, payment_id)) = effects.refund {
            self.execute_refund(&order_id, &payment_id)?;
        }
        Ok(())
    }

    /// Call the gateway and record the outcome
    fn execute_refund(&self, order_id: &str, payment_id: &str) -> SettlementResult<()> {
        let gateway_result = self.collaborators.gateway.refund(payment_id);
        let now = self.now();

        let txn = self.storage.begin_write()?;
        let mut payment = self
            .storage
            .get_payment_txn(&txn, payment_id)?
            .ok_or_else(|| SettlementError::PaymentNotFound(payment_id.to_string()))?;
        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| SettlementError::OrderNotFound(order_id.to_string()))?;

        match gateway_result {
            Ok(()) => {
                payment.status = PaymentStatus::Refunded;
                payment.last_error = None;
                payment.updated_at = now;
                order.payment_status = PaymentStatus::Refunded;
                order.updated_at = now;
                self.storage.store_payment(&txn, &payment)?;
                self.storage.store_order(&txn, &order)?;
                txn.commit()?;

                tracing::info!(order_id = %order_id, payment_id = %payment_id, amount = %payment.amount, "Refund completed");
                notify_best_effort(
                    self.collaborators.notifier.as_ref(),
                    &Notification {
                        user_id: order.customer_id.clone(),
                        kind: NotificationKind::RefundCompleted,
                        message: format!("Refund of {} for order {} completed", payment.amount, order.code),
                        link_url: Some(format!("/orders/{order_id}")),
                    },
                );
                Ok(())
            }
            Err(e) => {
                payment.last_error = Some(e.to_string());
                payment.updated_at = now;
                self.storage.store_payment(&txn, &payment)?;
                txn.commit()?;

                tracing::error!(
                    order_id = %order_id,
                    payment_id = %payment_id,
                    gateway = %self.collaborators.gateway.name(),
                    error = %e,
                    "Refund failed, payment left in REFUND_PENDING"
                );
                Err(SettlementError::RefundFailed {
                    order_id: order_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
