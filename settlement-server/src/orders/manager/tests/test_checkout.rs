use super::*;
use rust_decimal_macros::dec;
use shared::models::{Cart, PaymentStatus};

// ========================================================================
// 下单主流程
// ========================================================================

#[test]
fn test_checkout_creates_order_lines_and_payment() {
    let h = Harness::new();
    let tea = h.add_product("Oolong 250g", dec!(12800), 10);
    let cup = h.add_product("Tasting cup", dec!(3500), 20);
    let cart_id = h.cart_with(CUSTOMER, &[(&tea, 2), (&cup, 3)]);

    let outcome = h.checkout(CUSTOMER, &cart_id, &[]).unwrap();
    let order = &outcome.order;

    assert_eq!(order.code, "ORD2026101610001");
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.supplier_id, SUPPLIER);
    assert_eq!(order.subtotal, dec!(36100));
    assert_eq!(order.discount_amount, Decimal::ZERO);
    assert_eq!(order.total_amount, dec!(36100));

    assert_eq!(outcome.lines.len(), 2);
    assert_eq!(outcome.lines[0].line_no, 1);
    assert_eq!(outcome.lines[0].subtotal, dec!(25600));
    assert_eq!(outcome.lines[1].subtotal, dec!(10500));

    assert_eq!(outcome.payment.status, PaymentStatus::Pending);
    assert_eq!(outcome.payment.amount, order.total_amount);
    assert_eq!(order.payment_id.as_deref(), Some(outcome.payment.id.as_str()));

    assert_eq!(h.stock(&tea.id), 8);
    assert_eq!(h.stock(&cup.id), 17);

    // Cart is consumed
    assert!(h.state.storage.get_cart(&cart_id).unwrap().is_none());
    assert!(h.state.carts.find_cart(&Actor::customer(CUSTOMER), &h.store.id).unwrap().is_none());

    // Supplier hears about it
    let sent = h.notifier.sent_to(SUPPLIER);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::NewOrder);

    let found = h.orders().find_order_by_code(&Actor::customer(CUSTOMER), "ORD2026101610001").unwrap();
    assert_eq!(found.id, order.id);
}

#[test]
fn test_order_codes_count_up_per_day() {
    let h = Harness::new();
    let tea = h.add_product("Oolong", dec!(100), 50);

    let first = h.place_order(CUSTOMER, &[(&tea, 1)]);
    let second = h.place_order("cust-2", &[(&tea, 1)]);
    assert_eq!(first.code, "ORD2026101610001");
    assert_eq!(second.code, "ORD2026101610002");

    h.clock.advance_days(1);
    let next_day = h.place_order(CUSTOMER, &[(&tea, 1)]);
    assert_eq!(next_day.code, "ORD2026101710001");
}

#[test]
fn test_percentage_promotion_is_capped() {
    let h = Harness::new();
    h.create_promotion("SAVE10", dec!(10), Some(dec!(5000)), None, None);
    let tv = h.add_product("Projector", dec!(60000), 5);
    let cart_id = h.cart_with(CUSTOMER, &[(&tv, 1)]);

    let outcome = h.checkout(CUSTOMER, &cart_id, &["SAVE10"]).unwrap();

    assert_eq!(outcome.order.subtotal, dec!(60000));
    assert_eq!(outcome.order.discount_amount, dec!(5000));
    assert_eq!(outcome.order.total_amount, dec!(55000));
    assert_eq!(outcome.payment.amount, dec!(55000));
    assert_eq!(outcome.redemptions.len(), 1);
    assert_eq!(outcome.redemptions[0].order_id, outcome.order.id);
    assert_eq!(h.usage_count("SAVE10"), 1);
}

#[test]
fn test_codes_apply_in_sequence() {
    let h = Harness::new();
    h.create_promotion("HALF", dec!(50), None, None, None);
    h.create_promotion("TEN", dec!(10), None, None, None);
    let item = h.add_product("Kettle", dec!(1000), 5);
    let cart_id = h.cart_with(CUSTOMER, &[(&item, 1)]);

    let outcome = h.checkout(CUSTOMER, &cart_id, &["HALF", "TEN"]).unwrap();
    // 1000 → 500 → 450
    assert_eq!(outcome.redemptions[0].discount_amount, dec!(500));
    assert_eq!(outcome.redemptions[1].order_amount, dec!(500));
    assert_eq!(outcome.redemptions[1].discount_amount, dec!(50));
    assert_eq!(outcome.order.total_amount, dec!(450));
}

#[test]
fn test_duplicate_code_rejected() {
    let h = Harness::new();
    h.create_promotion("SAVE10", dec!(10), None, None, None);
    let item = h.add_product("Kettle", dec!(1000), 5);
    let cart_id = h.cart_with(CUSTOMER, &[(&item, 1)]);

    let err = h.checkout(CUSTOMER, &cart_id, &["SAVE10", "SAVE10"]).unwrap_err();
    assert!(matches!(err, SettlementError::InvalidInput(_)));
    assert_eq!(h.usage_count("SAVE10"), 0);
}

// ========================================================================
// 失败时整体回滚
// ========================================================================

#[test]
fn test_insufficient_stock_rolls_back_everything() {
    let h = Harness::new();
    let tea = h.add_product("Oolong", dec!(100), 10);
    let rare = h.add_product("Aged Pu-erh", dec!(9000), 1);
    let cart_id = h.cart_with(CUSTOMER, &[(&tea, 2), (&rare, 1)]);

    // Last unit sold elsewhere after it went into the cart
    h.state
        .inventory
        .adjust_stock(&Actor::supplier(SUPPLIER), &rare.id, -1)
        .unwrap();

    let err = h.checkout(CUSTOMER, &cart_id, &[]).unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InsufficientStock { requested: 1, available: 0, .. }
    ));

    // First line's reservation was not kept
    assert_eq!(h.stock(&tea.id), 10);
    assert_eq!(h.state.storage.count_orders().unwrap(), 0);
    assert!(h.state.storage.get_cart(&cart_id).unwrap().is_some());
    assert!(h.notifier.sent_to(SUPPLIER).is_empty());
}

#[test]
fn test_failed_second_code_releases_first_redemption() {
    let h = Harness::new();
    h.create_promotion("SAVE10", dec!(10), None, Some(5), None);
    let item = h.add_product("Kettle", dec!(1000), 5);
    let cart_id = h.cart_with(CUSTOMER, &[(&item, 2)]);

    let err = h.checkout(CUSTOMER, &cart_id, &["SAVE10", "NOPE"]).unwrap_err();
    assert!(matches!(err, SettlementError::PromotionNotFound(_)));

    assert_eq!(h.usage_count("SAVE10"), 0);
    assert!(h.state.promotions.redemptions("SAVE10").unwrap().is_empty());
    assert_eq!(h.stock(&item.id), 5);

    // Same cart checks out fine without the bad code, and the order counter
    // was not consumed by the failed attempt
    let outcome = h.checkout(CUSTOMER, &cart_id, &["SAVE10"]).unwrap();
    assert_eq!(outcome.order.code, "ORD2026101610001");
}

#[test]
fn test_empty_cart() {
    let h = Harness::new();
    let cart = Cart {
        id: "cart-empty".to_string(),
        customer_id: CUSTOMER.to_string(),
        store_id: h.store.id.clone(),
        lines: vec![],
        updated_at: h.now(),
    };
    let txn = h.state.storage.begin_write().unwrap();
    h.state.storage.store_cart(&txn, &cart).unwrap();
    txn.commit().unwrap();

    let err = h.checkout(CUSTOMER, "cart-empty", &[]).unwrap_err();
    assert!(matches!(err, SettlementError::EmptyCart));
}

#[test]
fn test_cart_of_another_customer() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(1000), 5);
    let cart_id = h.cart_with(CUSTOMER, &[(&item, 1)]);

    let err = h.checkout("cust-2", &cart_id, &[]).unwrap_err();
    assert!(matches!(err, SettlementError::UnauthorizedAccess(_)));
    assert_eq!(h.stock(&item.id), 5);
}

#[test]
fn test_missing_address_field() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(1000), 5);
    let cart_id = h.cart_with(CUSTOMER, &[(&item, 1)]);

    let mut addr = address();
    addr.phone = "  ".to_string();
    let err = h
        .orders()
        .checkout(
            &Actor::customer(CUSTOMER),
            CheckoutRequest {
                cart_id,
                shipping_address: addr,
                promotion_codes: vec![],
            },
        )
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidInput(msg) if msg.contains("phone")));
}

// ========================================================================
// 价格与商品状态以下单时为准
// ========================================================================

#[test]
fn test_checkout_uses_live_price() {
    let h = Harness::new();
    let item = h.add_product("Kettle", dec!(100), 5);
    let cart_id = h.cart_with(CUSTOMER, &[(&item, 2)]);

    h.state
        .inventory
        .upsert_product(
            &Actor::supplier(SUPPLIER),
            ProductInput {
                id: Some(item.id.clone()),
                store_id: h.store.id.clone(),
                name: item.name.clone(),
                unit_price: dec!(120),
                stock: item.stock,
                is_active: true,
                expires_at: None,
            },
        )
        .unwrap();

    let outcome = h.checkout(CUSTOMER, &cart_id, &[]).unwrap();
    assert_eq!(outcome.lines[0].unit_price, dec!(120));
    assert_eq!(outcome.order.total_amount, dec!(240));

    // Frozen: a later price change does not touch the order line
    h.state
        .inventory
        .upsert_product(
            &Actor::supplier(SUPPLIER),
            ProductInput {
                id: Some(item.id.clone()),
                store_id: h.store.id.clone(),
                name: item.name.clone(),
                unit_price: dec!(150),
                stock: 3,
                is_active: true,
                expires_at: None,
            },
        )
        .unwrap();
    let lines = h
        .orders()
        .get_order_lines(&Actor::customer(CUSTOMER), &outcome.order.id)
        .unwrap();
    assert_eq!(lines[0].unit_price, dec!(120));
}

#[test]
fn test_product_expired_since_added() {
    let h = Harness::new();
    let item = h
        .state
        .inventory
        .upsert_product(
            &Actor::supplier(SUPPLIER),
            ProductInput {
                id: None,
                store_id: h.store.id.clone(),
                name: "Fresh milk".to_string(),
                unit_price: dec!(25),
                stock: 10,
                is_active: true,
                expires_at: Some(h.now() + 3_600_000),
            },
        )
        .unwrap();
    let cart_id = h.cart_with(CUSTOMER, &[(&item, 1)]);

    h.clock.advance(std::time::Duration::from_secs(2 * 3600));
    let err = h.checkout(CUSTOMER, &cart_id, &[]).unwrap_err();
    assert!(matches!(err, SettlementError::ProductUnavailable(id) if id == item.id));
    assert_eq!(h.stock(&item.id), 10);
}
