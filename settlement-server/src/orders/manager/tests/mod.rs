//! OrdersManager 测试工具
//!
//! 所有测试共享同一套装配：内存数据库、手动时钟 (2026-10-16 10:00 UTC)、
//! 可控的支付网关和内存通知。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use shared::models::{Order, OrderStatus, PromotionStatus, ShippingAddress, Store, StoreProduct};

use super::*;
use crate::core::config::Config;
use crate::core::state::SettlementState;
use crate::inventory::ProductInput;
use crate::promotions::PromotionInput;
use crate::services::{
    CollaboratorError, FaultCounter, InMemoryNotifier, Notification, NotificationSink, PaymentGateway,
};
use crate::utils::ManualClock;

mod test_checkout;

pub(crate) const SUPPLIER: &str = "sup-1";
pub(crate) const CUSTOMER: &str = "cust-1";

/// Gateway whose refunds fail while `fail` is set
#[derive(Debug, Default)]
pub(crate) struct FlakyGateway {
    pub fail: AtomicBool,
    pub calls: AtomicU32,
}

impl FlakyGateway {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for FlakyGateway {
    fn refund(&self, _payment_id: &str) -> Result<(), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("gateway timeout".into()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Sink that is always down
#[derive(Debug, Default)]
pub(crate) struct DownNotifier {
    pub attempts: AtomicU32,
}

impl NotificationSink for DownNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CollaboratorError::Unavailable("push service down".into()))
    }

    fn name(&self) -> &str {
        "down"
    }
}

pub(crate) fn address() -> ShippingAddress {
    ShippingAddress {
        recipient: "Li Wei".to_string(),
        phone: "13800000000".to_string(),
        line1: "88 Huaihai Rd".to_string(),
        line2: None,
        city: "Shanghai".to_string(),
        postal_code: Some("200031".to_string()),
    }
}

pub(crate) struct Harness {
    pub state: SettlementState,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<InMemoryNotifier>,
    pub gateway: Arc<FlakyGateway>,
    pub faults: Arc<FaultCounter>,
    pub store: Store,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Same wiring, but every notification goes to `sink`
    pub fn with_notifier(sink: Arc<dyn NotificationSink>) -> Self {
        Self::build(Some(sink))
    }

    fn build(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        let storage = SettlementStorage::open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::at(
            NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        ));
        let notifier = Arc::new(InMemoryNotifier::new());
        let gateway = Arc::new(FlakyGateway::default());
        let faults = Arc::new(FaultCounter::new(3));
        let collaborators = Collaborators {
            notifier: sink.unwrap_or_else(|| notifier.clone() as Arc<dyn NotificationSink>),
            gateway: gateway.clone(),
            reputation: faults.clone(),
        };
        let mut config = Config::with_work_dir("/tmp/settlement-test");
        config.engine = EngineSettings::default();
        let state = SettlementState::with_storage(config, storage, clock.clone(), collaborators);

        let store = state
            .inventory
            .register_store(&Actor::supplier(SUPPLIER), SUPPLIER, "Tea House")
            .unwrap();
        state.wallets.open_wallet(&Actor::admin("root"), SUPPLIER).unwrap();

        Self {
            state,
            clock,
            notifier,
            gateway,
            faults,
            store,
        }
    }

    pub fn orders(&self) -> &OrdersManager {
        &self.state.orders
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn add_product(&self, name: &str, price: Decimal, stock: u32) -> StoreProduct {
        self.state
            .inventory
            .upsert_product(
                &Actor::supplier(SUPPLIER),
                ProductInput {
                    id: None,
                    store_id: self.store.id.clone(),
                    name: name.to_string(),
                    unit_price: price,
                    stock,
                    is_active: true,
                    expires_at: None,
                },
            )
            .unwrap()
    }

    pub fn stock(&self, product_id: &str) -> u32 {
        self.state.inventory.get_product(product_id).unwrap().stock
    }

    /// Fill the customer's cart and return its id
    pub fn cart_with(&self, customer: &str, lines: &[(&StoreProduct, u32)]) -> String {
        let actor = Actor::customer(customer);
        let mut cart_id = String::new();
        for (product, qty) in lines {
            cart_id = self.state.carts.set_quantity(&actor, &product.id, *qty).unwrap().id;
        }
        cart_id
    }

    pub fn checkout(
        &self,
        customer: &str,
        cart_id: &str,
        codes: &[&str],
    ) -> SettlementResult<CheckoutOutcome> {
        self.orders().checkout(
            &Actor::customer(customer),
            CheckoutRequest {
                cart_id: cart_id.to_string(),
                shipping_address: address(),
                promotion_codes: codes.iter().map(|c| c.to_string()).collect(),
            },
        )
    }

    pub fn place_order(&self, customer: &str, lines: &[(&StoreProduct, u32)]) -> Order {
        let cart_id = self.cart_with(customer, lines);
        self.checkout(customer, &cart_id, &[]).unwrap().order
    }

    /// Gateway callback: payment captured
    pub fn pay(&self, order_id: &str) -> Order {
        self.orders()
            .record_payment_result(&Actor::system(), order_id, true, None)
            .unwrap()
    }

    /// Supplier walks the order forward until it reaches `target`
    pub fn advance(&self, order_id: &str, target: OrderStatus) -> Order {
        let supplier = Actor::supplier(SUPPLIER);
        let mut order = self.state.storage.get_order(order_id).unwrap().unwrap();
        while order.status != target {
            order = match order.status {
                OrderStatus::Pending => self.orders().update_status(&supplier, order_id, OrderStatus::Confirmed),
                OrderStatus::Confirmed => self.orders().update_status(&supplier, order_id, OrderStatus::Preparing),
                OrderStatus::Preparing => {
                    self.orders()
                        .ship_order(&supplier, order_id, Some("SF1234567890".to_string()))
                }
                OrderStatus::Shipping => self.orders().update_status(&supplier, order_id, OrderStatus::Delivered),
                other => panic!("cannot advance from {other} to {target}"),
            }
            .unwrap();
        }
        order
    }

    pub fn create_promotion(
        &self,
        code: &str,
        percent: Decimal,
        cap: Option<Decimal>,
        usage_limit: Option<u32>,
        per_customer_limit: Option<u32>,
    ) {
        let now = self.now();
        let promotion = self
            .state
            .promotions
            .create_promotion(
                &Actor::admin("root"),
                PromotionInput {
                    code: code.to_string(),
                    name: format!("{code} campaign"),
                    discount_type: shared::models::DiscountType::Percentage,
                    discount_value: percent,
                    min_order_amount: None,
                    max_discount_amount: cap,
                    start_date: now - 1_000,
                    end_date: now + 30 * crate::utils::time::MILLIS_PER_DAY,
                    usage_limit,
                    per_customer_limit,
                },
            )
            .unwrap();
        assert_eq!(promotion.status, PromotionStatus::Active);
    }

    pub fn usage_count(&self, code: &str) -> u32 {
        self.state.promotions.get_promotion(code).unwrap().usage_count
    }

    pub fn wallet(&self) -> shared::models::SupplierWallet {
        self.state
            .wallets
            .get_wallet(&Actor::supplier(SUPPLIER), SUPPLIER)
            .unwrap()
    }
}
