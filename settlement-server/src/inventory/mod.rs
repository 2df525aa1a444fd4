//! Inventory Ledger
//!
//! Per-store-product stock counters plus the minimal catalog administration
//! that feeds them. Stock moves only inside a caller's write transaction
//! (`reserve_txn` at checkout, `restore_txn` on reversal) or through
//! [`InventoryLedger::adjust_stock`], so a read-check-then-write on stock is
//! always serialized by redb's single writer.

use std::sync::Arc;

use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::models::{Store, StoreProduct};
use shared::util::new_id;

use crate::auth::Actor;
use crate::core::error::{SettlementError, SettlementResult};
use crate::storage::SettlementStorage;
use crate::utils::Clock;

/// Product create/update input
#[derive(Debug, Clone)]
pub struct ProductInput {
    /// Existing product to update, `None` creates
    pub id: Option<String>,
    pub store_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub stock: u32,
    pub is_active: bool,
    pub expires_at: Option<i64>,
}

#[derive(Clone)]
pub struct InventoryLedger {
    storage: SettlementStorage,
    clock: Arc<dyn Clock>,
}

impl InventoryLedger {
    pub fn new(storage: SettlementStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    // ========== Catalog admin ==========

    /// Register a store for a supplier (admin, or the supplier itself)
    pub fn register_store(
        &self,
        actor: &Actor,
        supplier_id: &str,
        name: &str,
    ) -> SettlementResult<Store> {
        let store = Store {
            id: new_id(),
            supplier_id: supplier_id.to_string(),
            name: name.trim().to_string(),
            created_at: self.clock.now_millis(),
        };
        actor.require_store_owner(&store)?;
        if store.name.is_empty() {
            return Err(SettlementError::InvalidInput("store name is empty".into()));
        }

        let txn = self.storage.begin_write()?;
        self.storage.store_store(&txn, &store)?;
        txn.commit()?;

        tracing::info!(store_id = %store.id, supplier_id = %supplier_id, "Store registered");
        Ok(store)
    }

    pub fn get_store(&self, store_id: &str) -> SettlementResult<Store> {
        self.storage
            .get_store(store_id)?
            .ok_or_else(|| SettlementError::StoreNotFound(store_id.to_string()))
    }

    pub fn get_product(&self, product_id: &str) -> SettlementResult<StoreProduct> {
        self.storage
            .get_product(product_id)?
            .ok_or_else(|| SettlementError::ProductNotFound(product_id.to_string()))
    }

    /// Create or update a store product (store owner)
    pub fn upsert_product(&self, actor: &Actor, input: ProductInput) -> SettlementResult<StoreProduct> {
        if input.unit_price.is_sign_negative() {
            return Err(SettlementError::InvalidInput(format!(
                "unit price must be non-negative, got {}",
                input.unit_price
            )));
        }
        if input.name.trim().is_empty() {
            return Err(SettlementError::InvalidInput("product name is empty".into()));
        }

        let txn = self.storage.begin_write()?;
        let store = self
            .storage
            .get_store_txn(&txn, &input.store_id)?
            .ok_or_else(|| SettlementError::StoreNotFound(input.store_id.clone()))?;
        actor.require_store_owner(&store)?;

        let id = match input.id {
            Some(id) => {
                let existing = self
                    .storage
                    .get_product_txn(&txn, &id)?
                    .ok_or_else(|| SettlementError::ProductNotFound(id.clone()))?;
                if existing.store_id != store.id {
                    return Err(SettlementError::InvalidInput(format!(
                        "product {} belongs to store {}",
                        id, existing.store_id
                    )));
                }
                id
            }
            None => new_id(),
        };

        let product = StoreProduct {
            id,
            store_id: store.id,
            name: input.name.trim().to_string(),
            unit_price: shared::util::round_money(input.unit_price),
            stock: input.stock,
            is_active: input.is_active,
            expires_at: input.expires_at,
            updated_at: self.clock.now_millis(),
        };
        self.storage.store_product(&txn, &product)?;
        txn.commit()?;

        tracing::debug!(product_id = %product.id, stock = product.stock, "Product saved");
        Ok(product)
    }

    /// Apply a signed stock delta (restock or write-off), store owner only
    pub fn adjust_stock(&self, actor: &Actor, product_id: &str, delta: i64) -> SettlementResult<StoreProduct> {
        let txn = self.storage.begin_write()?;
        let mut product = self
            .storage
            .get_product_txn(&txn, product_id)?
            .ok_or_else(|| SettlementError::ProductNotFound(product_id.to_string()))?;
        let store = self
            .storage
            .get_store_txn(&txn, &product.store_id)?
            .ok_or_else(|| SettlementError::StoreNotFound(product.store_id.clone()))?;
        actor.require_store_owner(&store)?;

        let next = i64::from(product.stock) + delta;
        if next < 0 {
            return Err(SettlementError::InsufficientStock {
                product_id: product_id.to_string(),
                requested: delta.unsigned_abs().min(u64::from(u32::MAX)) as u32,
                available: product.stock,
            });
        }
        product.stock = u32::try_from(next)
            .map_err(|_| SettlementError::InvalidInput(format!("stock overflow: {next}")))?;
        product.updated_at = self.clock.now_millis();
        self.storage.store_product(&txn, &product)?;
        txn.commit()?;

        tracing::info!(product_id = %product_id, delta, stock = product.stock, "Stock adjusted");
        Ok(product)
    }

    // ========== Transactional stock moves ==========

    /// Check availability and decrement stock for one checkout line
    ///
    /// Returns the product as it was read (current price and name).
    pub fn reserve_txn(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
        quantity: u32,
        now: i64,
    ) -> SettlementResult<StoreProduct> {
        let mut product = self
            .storage
            .get_product_txn(txn, product_id)?
            .ok_or_else(|| SettlementError::ProductNotFound(product_id.to_string()))?;

        if !product.is_available(now) {
            return Err(SettlementError::ProductUnavailable(product_id.to_string()));
        }
        if quantity == 0 || product.stock < quantity {
            return Err(SettlementError::InsufficientStock {
                product_id: product_id.to_string(),
                requested: quantity,
                available: product.stock,
            });
        }

        let snapshot = product.clone();
        product.stock -= quantity;
        product.updated_at = now;
        self.storage.store_product(txn, &product)?;
        Ok(snapshot)
    }

    /// Put stock back for a reversed order line
    ///
    /// Restores even when the listing is inactive or expired; the counter must
    /// reflect physical stock.
    pub fn restore_txn(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
        quantity: u32,
        now: i64,
    ) -> SettlementResult<()> {
        let Some(mut product) = self.storage.get_product_txn(txn, product_id)? else {
            tracing::warn!(product_id = %product_id, quantity, "Product missing, stock not restored");
            return Ok(());
        };
        product.stock = product.stock.saturating_add(quantity);
        product.updated_at = now;
        self.storage.store_product(txn, &product)?;
        tracing::debug!(product_id = %product_id, quantity, stock = product.stock, "Stock restored");
        Ok(())
    }
}
