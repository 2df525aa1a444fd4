//! Cancellation / return review workflow
//!
//! ```text
//! PENDING_REVIEW ──approve──→ APPROVED   (order reversed in the same transaction)
//!        └────────reject───→ REJECTED
//! ```
//!
//! At most one open request per (order, kind). Returns must be submitted
//! within `return_window_days` of delivery.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::models::{Order, OrderStatus, RequestKind, ReviewRequest, ReviewStatus};
use shared::util::new_id;

use crate::auth::Actor;
use crate::core::error::{SettlementError, SettlementResult};
use crate::orders::OrdersManager;
use crate::orders::manager::{Effects, TransitionContext};
use crate::services::notification::notify_best_effort;
use crate::services::{Notification, NotificationKind, NotificationSink};
use crate::storage::SettlementStorage;
use crate::utils::Clock;
use crate::utils::time::MILLIS_PER_DAY;

/// Customer submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub order_id: String,
    pub kind: RequestKind,
    pub reason: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

#[derive(Clone)]
pub struct ReviewService {
    storage: SettlementStorage,
    orders: OrdersManager,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    return_window_days: i64,
}

impl ReviewService {
    pub fn new(
        storage: SettlementStorage,
        orders: OrdersManager,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
        return_window_days: i64,
    ) -> Self {
        Self {
            storage,
            orders,
            clock,
            notifier,
            return_window_days,
        }
    }

    pub fn submit_request(&self, actor: &Actor, input: SubmitRequest) -> SettlementResult<ReviewRequest> {
        if input.reason.trim().is_empty() {
            return Err(SettlementError::InvalidInput("reason is required".to_string()));
        }
        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;
        let order = self.orders.load_order_txn(&txn, &input.order_id)?;
        actor.require_customer(&order.customer_id)?;
        self.check_eligible(&order, input.kind, now)?;

        if self
            .storage
            .get_open_request_txn(&txn, &order.id, input.kind)?
            .is_some()
        {
            return Err(SettlementError::RequestAlreadyOpen {
                order_id: order.id,
                kind: input.kind,
            });
        }

        let request = ReviewRequest {
            id: new_id(),
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            kind: input.kind,
            reason: input.reason.trim().to_string(),
            description: input.description,
            evidence_urls: input.evidence_urls,
            status: ReviewStatus::PendingReview,
            reviewer_id: None,
            review_note: None,
            reviewed_at: None,
            refund_amount: order.total_amount,
            created_at: now,
        };
        self.storage.store_request(&txn, &request)?;
        self.storage
            .set_open_request(&txn, &order.id, request.kind, &request.id)?;
        txn.commit()?;

        tracing::info!(request_id = %request.id, order_id = %order.id, kind = ?request.kind, "Review request submitted");
        self.notify(
            &order.supplier_id,
            NotificationKind::RequestSubmitted,
            format!("{} request for order {}", request.kind.as_str(), order.code),
            &request,
        );
        Ok(request)
    }

    /// Approve and reverse the order in the same unit of work
    ///
    /// A cancellation of an order in transit ends as `RETURNED`.
    pub fn approve(
        &self,
        actor: &Actor,
        request_id: &str,
        note: Option<String>,
    ) -> SettlementResult<ReviewRequest> {
        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;
        let mut request = self.load_pending_txn(&txn, request_id, ReviewStatus::Approved)?;
        let mut order = self.orders.load_order_txn(&txn, &request.order_id)?;
        actor.require_order_supplier(&order)?;

        let (target, customer_fault) = match request.kind {
            RequestKind::Cancellation if order.status == OrderStatus::Shipping => {
                (OrderStatus::Returned, true)
            }
            RequestKind::Cancellation => {
                (OrderStatus::Canceled, order.status != OrderStatus::Pending)
            }
            RequestKind::Return => (OrderStatus::Returned, false),
        };
        let ctx = TransitionContext {
            reason: Some(request.reason.clone()),
            customer_fault,
            tracking_code: None,
        };
        // Cleared before the transition so it is not swept up as superseded
        self.storage
            .clear_open_request(&txn, &request.order_id, request.kind)?;
        let mut effects = Effects::default();
        self.orders
            .apply_transition_txn(&txn, &mut order, target, &ctx, &mut effects)?;

        request.status = ReviewStatus::Approved;
        request.reviewer_id = Some(actor.user_id.clone());
        request.review_note = note;
        request.reviewed_at = Some(now);
        request.refund_amount = order.total_amount;
        self.storage.store_request(&txn, &request)?;
        txn.commit()?;

        tracing::info!(
            request_id = %request_id,
            order_id = %order.id,
            status = %order.status,
            customer_fault,
            "Review request approved"
        );
        self.notify(
            &request.customer_id,
            NotificationKind::RequestReviewed,
            format!("Your {} request for order {} was approved", request.kind.as_str(), order.code),
            &request,
        );
        self.orders.dispatch_effects(effects)?;
        Ok(request)
    }

    pub fn reject(
        &self,
        actor: &Actor,
        request_id: &str,
        note: Option<String>,
    ) -> SettlementResult<ReviewRequest> {
        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;
        let mut request = self.load_pending_txn(&txn, request_id, ReviewStatus::Rejected)?;
        let order = self.orders.load_order_txn(&txn, &request.order_id)?;
        actor.require_order_supplier(&order)?;

        request.status = ReviewStatus::Rejected;
        request.reviewer_id = Some(actor.user_id.clone());
        request.review_note = note;
        request.reviewed_at = Some(now);
        self.storage.store_request(&txn, &request)?;
        self.storage
            .clear_open_request(&txn, &request.order_id, request.kind)?;
        txn.commit()?;

        tracing::info!(request_id = %request_id, order_id = %order.id, "Review request rejected");
        self.notify(
            &request.customer_id,
            NotificationKind::RequestReviewed,
            format!("Your {} request for order {} was rejected", request.kind.as_str(), order.code),
            &request,
        );
        Ok(request)
    }

    pub fn get_request(&self, actor: &Actor, request_id: &str) -> SettlementResult<ReviewRequest> {
        let request = self
            .storage
            .get_request(request_id)?
            .ok_or_else(|| SettlementError::RequestNotFound(request_id.to_string()))?;
        self.orders.get_order(actor, &request.order_id)?;
        Ok(request)
    }

    /// Open request of `kind` for an order, if any
    pub fn open_request(
        &self,
        actor: &Actor,
        order_id: &str,
        kind: RequestKind,
    ) -> SettlementResult<Option<ReviewRequest>> {
        self.orders.get_order(actor, order_id)?;
        match self.storage.get_open_request(order_id, kind)? {
            Some(id) => Ok(self.storage.get_request(&id)?),
            None => Ok(None),
        }
    }

    fn check_eligible(&self, order: &Order, kind: RequestKind, now: i64) -> SettlementResult<()> {
        match kind {
            RequestKind::Cancellation => {
                if order.status.is_terminal() || order.status == OrderStatus::Delivered {
                    return Err(SettlementError::transition(order.status, OrderStatus::Canceled));
                }
            }
            RequestKind::Return => {
                let Some(delivered_at) = order.delivered_at.filter(|_| order.status == OrderStatus::Delivered)
                else {
                    return Err(SettlementError::transition(order.status, OrderStatus::Returned));
                };
                if now - delivered_at > self.return_window_days * MILLIS_PER_DAY {
                    return Err(SettlementError::ReturnPeriodExpired {
                        order_id: order.id.clone(),
                        window_days: self.return_window_days,
                    });
                }
            }
        }
        Ok(())
    }

    fn load_pending_txn(
        &self,
        txn: &redb::WriteTransaction,
        request_id: &str,
        decision: ReviewStatus,
    ) -> SettlementResult<ReviewRequest> {
        let request = self
            .storage
            .get_request_txn(txn, request_id)?
            .ok_or_else(|| SettlementError::RequestNotFound(request_id.to_string()))?;
        if request.status.is_decided() {
            return Err(SettlementError::InvalidStateTransition {
                from: format!("{:?}", request.status),
                to: format!("{decision:?}"),
            });
        }
        Ok(request)
    }

    fn notify(&self, user_id: &str, kind: NotificationKind, message: String, request: &ReviewRequest) {
        notify_best_effort(
            self.notifier.as_ref(),
            &Notification {
                user_id: user_id.to_string(),
                kind,
                message,
                link_url: Some(format!("/orders/{}/requests/{}", request.order_id, request.id)),
            },
        );
    }
}

#[cfg(test)]
mod tests;
