use super::*;
use crate::orders::manager::tests::{CUSTOMER, Harness, SUPPLIER};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shared::models::{LedgerEntryType, PaymentStatus, StoreProduct};

fn request(order_id: &str, kind: RequestKind) -> SubmitRequest {
    SubmitRequest {
        order_id: order_id.to_string(),
        kind,
        reason: "Arrived damaged".to_string(),
        description: Some("Lid cracked".to_string()),
        evidence_urls: vec!["https://img.example/lid.jpg".to_string()],
    }
}

/// Paid and delivered order for 100,000
fn delivered_order(h: &Harness) -> (Order, StoreProduct) {
    let item = h.add_product("Espresso machine", dec!(100000), 3);
    let order = h.place_order(CUSTOMER, &[(&item, 1)]);
    h.pay(&order.id);
    (h.advance(&order.id, OrderStatus::Delivered), item)
}

fn customer() -> Actor {
    Actor::customer(CUSTOMER)
}

fn supplier() -> Actor {
    Actor::supplier(SUPPLIER)
}

// ========================================================================
// 提交
// ========================================================================

#[test]
fn test_return_window() {
    let h = Harness::new();
    let (order, _) = delivered_order(&h);

    h.clock.advance_days(8);
    let err = h
        .state
        .reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::ReturnPeriodExpired { window_days: 7, .. }
    ));

    let h = Harness::new();
    let (order, _) = delivered_order(&h);
    h.clock.advance_days(7);
    let submitted = h
        .state
        .reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap();
    assert_eq!(submitted.status, ReviewStatus::PendingReview);
    assert_eq!(submitted.refund_amount, dec!(100000));
    assert_eq!(submitted.evidence_urls.len(), 1);

    let supplier_msgs = h.notifier.sent_to(SUPPLIER);
    assert!(supplier_msgs.iter().any(|n| n.kind == NotificationKind::RequestSubmitted));
}

#[test]
fn test_one_open_request_per_kind() {
    let h = Harness::new();
    let (order, _) = delivered_order(&h);
    let reviews = &h.state.reviews;

    let first = reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap();
    let err = reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::RequestAlreadyOpen { kind: RequestKind::Return, .. }
    ));

    let open = reviews
        .open_request(&supplier(), &order.id, RequestKind::Return)
        .unwrap()
        .unwrap();
    assert_eq!(open.id, first.id);

    // Rejection closes it, a new request may follow
    reviews.reject(&supplier(), &first.id, Some("No damage visible".into())).unwrap();
    assert!(reviews.open_request(&customer(), &order.id, RequestKind::Return).unwrap().is_none());
    assert!(reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .is_ok());
}

#[test]
fn test_submission_eligibility() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(1000), 5);
    let order = h.place_order(CUSTOMER, &[(&item, 1)]);
    let reviews = &h.state.reviews;

    // Not delivered yet
    assert!(matches!(
        reviews.submit_request(&customer(), request(&order.id, RequestKind::Return)),
        Err(SettlementError::InvalidStateTransition { .. })
    ));
    // Someone else's order
    assert!(matches!(
        reviews.submit_request(&Actor::customer("cust-2"), request(&order.id, RequestKind::Cancellation)),
        Err(SettlementError::UnauthorizedAccess(_))
    ));
    // Blank reason
    let mut blank = request(&order.id, RequestKind::Cancellation);
    blank.reason = "   ".to_string();
    assert!(matches!(
        reviews.submit_request(&customer(), blank),
        Err(SettlementError::InvalidInput(_))
    ));

    h.advance(&order.id, OrderStatus::Delivered);
    assert!(matches!(
        reviews.submit_request(&customer(), request(&order.id, RequestKind::Cancellation)),
        Err(SettlementError::InvalidStateTransition { .. })
    ));
}

// ========================================================================
// 审批
// ========================================================================

#[test]
fn test_approved_return_debits_wallet_and_refunds() {
    let h = Harness::new();
    let (order, item) = delivered_order(&h);
    assert_eq!(h.wallet().pending_balance, dec!(90000));
    assert_eq!(h.state.storage.get_loyalty_points(CUSTOMER).unwrap(), 1000);

    let submitted = h
        .state
        .reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap();
    let approved = h
        .state
        .reviews
        .approve(&supplier(), &submitted.id, Some("Accepted".into()))
        .unwrap();
    assert_eq!(approved.status, ReviewStatus::Approved);
    assert_eq!(approved.reviewer_id.as_deref(), Some(SUPPLIER));
    assert_eq!(approved.reviewed_at, Some(h.now()));

    let order = h.orders().get_order(&customer(), &order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Returned);
    assert!(!order.customer_fault);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert!(order.settlement.as_ref().unwrap().reversed_at.is_some());
    assert_eq!(order.loyalty_points_awarded, 0);
    assert_eq!(h.state.storage.get_loyalty_points(CUSTOMER).unwrap(), 0);
    assert_eq!(h.stock(&item.id), 3);

    let wallet = h.wallet();
    assert_eq!(wallet.pending_balance, Decimal::ZERO);
    assert_eq!(wallet.total_refunded, dec!(90000));
    assert!(wallet.is_balanced());
    assert!(h.state.wallets.verify_invariant(SUPPLIER).unwrap());

    let entries = h.state.wallets.ledger_entries(&supplier(), SUPPLIER).unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.entry_type, LedgerEntryType::RefundDebit);
    assert_eq!(last.amount, dec!(-90000));
    assert_eq!(h.faults.fault_count(CUSTOMER), 0);

    let reviewed = h
        .notifier
        .sent_to(CUSTOMER)
        .into_iter()
        .filter(|n| n.kind == NotificationKind::RequestReviewed)
        .count();
    assert_eq!(reviewed, 1);
}

#[test]
fn test_cancellation_in_transit_becomes_return_with_fault() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(1000), 5);
    let order = h.place_order(CUSTOMER, &[(&item, 2)]);
    h.pay(&order.id);
    h.advance(&order.id, OrderStatus::Shipping);

    let submitted = h
        .state
        .reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Cancellation))
        .unwrap();
    h.state.reviews.approve(&supplier(), &submitted.id, None).unwrap();

    let order = h.orders().get_order(&customer(), &order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Returned);
    assert!(order.customer_fault);
    assert_eq!(order.cancel_reason.as_deref(), Some("Arrived damaged"));
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(h.faults.fault_count(CUSTOMER), 1);
    assert_eq!(h.stock(&item.id), 5);

    // Never credited, so the wallet is untouched
    let wallet = h.wallet();
    assert_eq!(wallet.total_refunded, Decimal::ZERO);
    assert!(h.state.wallets.ledger_entries(&supplier(), SUPPLIER).unwrap().is_empty());
}

#[test]
fn test_cancellation_of_pending_order_is_no_fault() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(1000), 5);
    let order = h.place_order(CUSTOMER, &[(&item, 1)]);

    let submitted = h
        .state
        .reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Cancellation))
        .unwrap();
    h.state.reviews.approve(&supplier(), &submitted.id, None).unwrap();

    let order = h.orders().get_order(&customer(), &order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Canceled);
    assert!(!order.customer_fault);
}

#[test]
fn test_rejection_leaves_order_alone() {
    let h = Harness::new();
    let (order, _) = delivered_order(&h);
    let submitted = h
        .state
        .reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap();

    let rejected = h
        .state
        .reviews
        .reject(&supplier(), &submitted.id, Some("Outside policy".into()))
        .unwrap();
    assert_eq!(rejected.status, ReviewStatus::Rejected);
    assert_eq!(rejected.review_note.as_deref(), Some("Outside policy"));

    let order = h.orders().get_order(&customer(), &order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(h.wallet().pending_balance, dec!(90000));
}

#[test]
fn test_request_decided_once() {
    let h = Harness::new();
    let (order, _) = delivered_order(&h);
    let reviews = &h.state.reviews;
    let submitted = reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap();

    reviews.approve(&supplier(), &submitted.id, None).unwrap();
    assert!(matches!(
        reviews.approve(&supplier(), &submitted.id, None),
        Err(SettlementError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        reviews.reject(&supplier(), &submitted.id, None),
        Err(SettlementError::InvalidStateTransition { .. })
    ));
    // Debited exactly once
    assert_eq!(h.wallet().total_refunded, dec!(90000));
}

#[test]
fn test_review_authorization() {
    let h = Harness::new();
    let (order, _) = delivered_order(&h);
    let reviews = &h.state.reviews;
    let submitted = reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap();

    for actor in [customer(), Actor::supplier("sup-2")] {
        assert!(matches!(
            reviews.approve(&actor, &submitted.id, None),
            Err(SettlementError::UnauthorizedAccess(_))
        ));
    }
    assert!(matches!(
        reviews.get_request(&Actor::customer("cust-2"), &submitted.id),
        Err(SettlementError::UnauthorizedAccess(_))
    ));
    assert!(matches!(
        reviews.approve(&supplier(), "missing", None),
        Err(SettlementError::RequestNotFound(_))
    ));

    // Still pending after the denied attempts
    let current = reviews.get_request(&customer(), &submitted.id).unwrap();
    assert_eq!(current.status, ReviewStatus::PendingReview);
    assert!(reviews.approve(&Actor::admin("root"), &submitted.id, None).is_ok());
}

// ========================================================================
// 订单先行终结
// ========================================================================

#[test]
fn test_self_cancel_closes_open_cancellation_request() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(1000), 5);
    let order = h.place_order(CUSTOMER, &[(&item, 1)]);
    h.advance(&order.id, OrderStatus::Confirmed);
    let reviews = &h.state.reviews;

    let submitted = reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Cancellation))
        .unwrap();
    h.orders().cancel_order(&customer(), &order.id, None).unwrap();

    let closed = reviews.get_request(&customer(), &submitted.id).unwrap();
    assert_eq!(closed.status, ReviewStatus::Rejected);
    assert_eq!(closed.review_note.as_deref(), Some("Superseded by order status CANCELED"));
    assert_eq!(closed.reviewed_at, Some(h.now()));
    assert!(reviews
        .open_request(&customer(), &order.id, RequestKind::Cancellation)
        .unwrap()
        .is_none());

    // Decided, so the supplier can no longer act on it
    assert!(matches!(
        reviews.approve(&supplier(), &submitted.id, None),
        Err(SettlementError::InvalidStateTransition { .. })
    ));
    assert_eq!(h.stock(&item.id), 5);
}

#[test]
fn test_approved_return_supersedes_stale_cancellation() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(1000), 5);
    let order = h.place_order(CUSTOMER, &[(&item, 1)]);
    h.pay(&order.id);
    h.advance(&order.id, OrderStatus::Shipping);
    let reviews = &h.state.reviews;

    // Asked to cancel in transit, the parcel arrived anyway
    let cancellation = reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Cancellation))
        .unwrap();
    h.advance(&order.id, OrderStatus::Delivered);
    let ret = reviews
        .submit_request(&customer(), request(&order.id, RequestKind::Return))
        .unwrap();
    let approved = reviews.approve(&supplier(), &ret.id, None).unwrap();
    assert_eq!(approved.status, ReviewStatus::Approved);

    let stale = reviews.get_request(&customer(), &cancellation.id).unwrap();
    assert_eq!(stale.status, ReviewStatus::Rejected);
    assert_eq!(stale.review_note.as_deref(), Some("Superseded by order status RETURNED"));
    for kind in [RequestKind::Cancellation, RequestKind::Return] {
        assert!(reviews.open_request(&customer(), &order.id, kind).unwrap().is_none());
    }

    let order = h.orders().get_order(&customer(), &order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Returned);
    assert!(!order.customer_fault);
    assert_eq!(h.wallet().total_refunded, dec!(900));
}
