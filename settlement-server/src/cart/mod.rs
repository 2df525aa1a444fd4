//! Per-store carts
//!
//! A customer holds at most one cart per store. Lines carry the price seen
//! when they were last touched; checkout always re-reads the catalog, and
//! [`CartService::validate_cart`] lets the customer see adjustments first.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{Cart, CartLine};
use shared::util::{new_id, round_money};

use crate::auth::Actor;
use crate::core::error::{SettlementError, SettlementResult};
use crate::storage::SettlementStorage;
use crate::utils::Clock;

/// Change applied to a cart by validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartAdjustment {
    /// Product inactive, expired, deleted or out of stock
    Removed { store_product_id: String, reason: String },
    /// Quantity lowered to the stock on hand
    QuantityClamped {
        store_product_id: String,
        from: u32,
        to: u32,
    },
    PriceChanged {
        store_product_id: String,
        old_price: Decimal,
        new_price: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct CartValidation {
    pub cart: Cart,
    pub adjustments: Vec<CartAdjustment>,
}

impl CartValidation {
    pub fn is_clean(&self) -> bool {
        self.adjustments.is_empty()
    }
}

#[derive(Clone)]
pub struct CartService {
    storage: SettlementStorage,
    clock: Arc<dyn Clock>,
}

impl CartService {
    pub fn new(storage: SettlementStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn get_cart(&self, actor: &Actor, cart_id: &str) -> SettlementResult<Cart> {
        let cart = self
            .storage
            .get_cart(cart_id)?
            .ok_or_else(|| SettlementError::CartNotFound(cart_id.to_string()))?;
        if !actor.is_privileged() {
            actor.require_customer(&cart.customer_id)?;
        }
        Ok(cart)
    }

    /// The caller's cart for a store, if any
    pub fn find_cart(&self, actor: &Actor, store_id: &str) -> SettlementResult<Option<Cart>> {
        match self.storage.find_cart_id(&actor.user_id, store_id)? {
            Some(cart_id) => self.get_cart(actor, &cart_id).map(Some),
            None => Ok(None),
        }
    }

    /// Set the quantity of a product in the caller's cart (0 removes the line)
    pub fn set_quantity(
        &self,
        actor: &Actor,
        store_product_id: &str,
        quantity: u32,
    ) -> SettlementResult<Cart> {
        self.put_line(actor, store_product_id, |_| Ok(quantity))
    }

    /// Add `quantity` on top of what the cart already holds
    pub fn add_item(&self, actor: &Actor, store_product_id: &str, quantity: u32) -> SettlementResult<Cart> {
        if quantity == 0 {
            return Err(SettlementError::InvalidInput("quantity must be positive".into()));
        }
        self.put_line(actor, store_product_id, |current| {
            current.checked_add(quantity).ok_or_else(|| {
                SettlementError::InvalidInput(format!("quantity overflow: {current} + {quantity}"))
            })
        })
    }

    fn put_line(
        &self,
        actor: &Actor,
        store_product_id: &str,
        next_quantity: impl FnOnce(u32) -> SettlementResult<u32>,
    ) -> SettlementResult<Cart> {
        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;

        let product = self
            .storage
            .get_product_txn(&txn, store_product_id)?
            .ok_or_else(|| SettlementError::ProductNotFound(store_product_id.to_string()))?;
        actor.require_customer(&actor.user_id)?;

        let existing = match self
            .storage
            .find_cart_id_txn(&txn, &actor.user_id, &product.store_id)?
        {
            Some(id) => self.storage.get_cart_txn(&txn, &id)?,
            None => None,
        };
        let current = existing
            .as_ref()
            .and_then(|c| c.lines.iter().find(|l| l.store_product_id == product.id))
            .map_or(0, |l| l.quantity);
        let quantity = next_quantity(current)?;

        if quantity > 0 {
            if !product.is_available(now) {
                return Err(SettlementError::ProductUnavailable(product.id));
            }
            if product.stock < quantity {
                return Err(SettlementError::InsufficientStock {
                    product_id: product.id,
                    requested: quantity,
                    available: product.stock,
                });
            }
        }

        let mut cart = existing.unwrap_or_else(|| Cart {
            id: new_id(),
            customer_id: actor.user_id.clone(),
            store_id: product.store_id.clone(),
            lines: Vec::new(),
            updated_at: now,
        });

        cart.lines.retain(|l| l.store_product_id != product.id);
        if quantity > 0 {
            cart.lines.push(CartLine {
                store_product_id: product.id.clone(),
                quantity,
                unit_price: product.unit_price,
                amount: round_money(product.unit_price * Decimal::from(quantity)),
            });
        }
        cart.updated_at = now;

        if cart.lines.is_empty() {
            self.storage.delete_cart(&txn, &cart)?;
        } else {
            self.storage.store_cart(&txn, &cart)?;
        }
        txn.commit()?;

        tracing::debug!(cart_id = %cart.id, product_id = %store_product_id, from = current, quantity, "Cart line set");
        Ok(cart)
    }

    pub fn remove_line(&self, actor: &Actor, store_product_id: &str) -> SettlementResult<Cart> {
        self.set_quantity(actor, store_product_id, 0)
    }

    /// Reconcile a cart with the live catalog
    ///
    /// Drops unavailable products, clamps quantities to stock and refreshes
    /// prices. The adjusted cart is persisted.
    pub fn validate_cart(&self, actor: &Actor, cart_id: &str) -> SettlementResult<CartValidation> {
        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;
        let mut cart = self
            .storage
            .get_cart_txn(&txn, cart_id)?
            .ok_or_else(|| SettlementError::CartNotFound(cart_id.to_string()))?;
        actor.require_customer(&cart.customer_id)?;

        let mut adjustments = Vec::new();
        let mut kept = Vec::with_capacity(cart.lines.len());

        for mut line in std::mem::take(&mut cart.lines) {
            let product = self.storage.get_product_txn(&txn, &line.store_product_id)?;
            let Some(product) = product else {
                adjustments.push(CartAdjustment::Removed {
                    store_product_id: line.store_product_id,
                    reason: "product no longer exists".to_string(),
                });
                continue;
            };
            if !product.is_available(now) || product.stock == 0 {
                let reason = if product.stock == 0 && product.is_available(now) {
                    "out of stock"
                } else {
                    "product unavailable"
                };
                adjustments.push(CartAdjustment::Removed {
                    store_product_id: line.store_product_id,
                    reason: reason.to_string(),
                });
                continue;
            }
            if line.quantity > product.stock {
                adjustments.push(CartAdjustment::QuantityClamped {
                    store_product_id: line.store_product_id.clone(),
                    from: line.quantity,
                    to: product.stock,
                });
                line.quantity = product.stock;
            }
            if line.unit_price != product.unit_price {
                adjustments.push(CartAdjustment::PriceChanged {
                    store_product_id: line.store_product_id.clone(),
                    old_price: line.unit_price,
                    new_price: product.unit_price,
                });
                line.unit_price = product.unit_price;
            }
            line.amount = round_money(line.unit_price * Decimal::from(line.quantity));
            kept.push(line);
        }

        cart.lines = kept;
        if !adjustments.is_empty() {
            cart.updated_at = now;
            self.storage.store_cart(&txn, &cart)?;
            txn.commit()?;
            tracing::info!(cart_id = %cart_id, adjustments = adjustments.len(), "Cart adjusted by validation");
        }

        Ok(CartValidation { cart, adjustments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryLedger, ProductInput};
    use crate::utils::ManualClock;
    use rust_decimal_macros::dec;

    struct Fixture {
        carts: CartService,
        inventory: InventoryLedger,
        store_id: String,
        tea: String,
        cake: String,
    }

    fn setup() -> Fixture {
        let storage = SettlementStorage::open_in_memory().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
        let inventory = InventoryLedger::new(storage.clone(), clock.clone());
        let owner = Actor::supplier("sup-1");
        let store = inventory.register_store(&owner, "sup-1", "Bakery").unwrap();
        let add = |name: &str, price, stock| {
            inventory
                .upsert_product(
                    &owner,
                    ProductInput {
                        id: None,
                        store_id: store.id.clone(),
                        name: name.to_string(),
                        unit_price: price,
                        stock,
                        is_active: true,
                        expires_at: None,
                    },
                )
                .unwrap()
                .id
        };
        let tea = add("Tea", dec!(3.00), 10);
        let cake = add("Cake", dec!(8.50), 2);
        Fixture {
            carts: CartService::new(storage, clock),
            inventory,
            store_id: store.id,
            tea,
            cake,
        }
    }

    #[test]
    fn test_set_quantity_creates_one_cart_per_store() {
        let f = setup();
        let customer = Actor::customer("c1");
        let first = f.carts.set_quantity(&customer, &f.tea, 2).unwrap();
        let second = f.carts.set_quantity(&customer, &f.cake, 1).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.total(), dec!(14.50));

        let found = f.carts.find_cart(&customer, &f.store_id).unwrap().unwrap();
        assert_eq!(found.lines.len(), 2);

        // Removing every line deletes the cart
        f.carts.remove_line(&customer, &f.tea).unwrap();
        f.carts.remove_line(&customer, &f.cake).unwrap();
        assert!(f.carts.find_cart(&customer, &f.store_id).unwrap().is_none());
    }

    #[test]
    fn test_add_item_accumulates() {
        let f = setup();
        let customer = Actor::customer("c1");
        f.carts.add_item(&customer, &f.tea, 2).unwrap();
        let cart = f.carts.add_item(&customer, &f.tea, 3).unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 5);
        assert_eq!(cart.total(), dec!(15.00));

        // The sum is checked against stock, not the increment
        let err = f.carts.add_item(&customer, &f.tea, 6).unwrap_err();
        assert!(matches!(err, SettlementError::InsufficientStock { requested: 11, .. }));
    }

    #[test]
    fn test_set_quantity_checks_stock() {
        let f = setup();
        let err = f.carts.set_quantity(&Actor::customer("c1"), &f.cake, 3).unwrap_err();
        assert!(matches!(err, SettlementError::InsufficientStock { available: 2, .. }));
    }

    #[test]
    fn test_validate_cart_adjusts_lines() {
        let f = setup();
        let customer = Actor::customer("c1");
        f.carts.set_quantity(&customer, &f.tea, 5).unwrap();
        let cart = f.carts.set_quantity(&customer, &f.cake, 2).unwrap();

        let owner = Actor::supplier("sup-1");
        // Tea: stock drops to 3 and price rises; cake sells out
        f.inventory.adjust_stock(&owner, &f.tea, -7).unwrap();
        f.inventory
            .upsert_product(
                &owner,
                ProductInput {
                    id: Some(f.tea.clone()),
                    store_id: f.store_id.clone(),
                    name: "Tea".to_string(),
                    unit_price: dec!(3.20),
                    stock: 3,
                    is_active: true,
                    expires_at: None,
                },
            )
            .unwrap();
        f.inventory.adjust_stock(&owner, &f.cake, -2).unwrap();

        let result = f.carts.validate_cart(&customer, &cart.id).unwrap();
        assert_eq!(result.adjustments.len(), 3);
        assert_eq!(result.cart.lines.len(), 1);
        assert_eq!(result.cart.lines[0].quantity, 3);
        assert_eq!(result.cart.total(), dec!(9.60));

        // Second pass is clean
        assert!(f.carts.validate_cart(&customer, &cart.id).unwrap().is_clean());
    }

    #[test]
    fn test_cart_of_other_customer_is_hidden() {
        let f = setup();
        let cart = f.carts.set_quantity(&Actor::customer("c1"), &f.tea, 1).unwrap();
        assert!(matches!(
            f.carts.get_cart(&Actor::customer("c2"), &cart.id),
            Err(SettlementError::UnauthorizedAccess(_))
        ));
    }
}
