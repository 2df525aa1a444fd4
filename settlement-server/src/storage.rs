//! redb-based storage layer for the settlement engine
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Order headers |
//! | `order_codes` | `code` | `order_id` | Human-readable code index (unique) |
//! | `order_lines` | `(order_id, line_no)` | `OrderLineItem` | Frozen order lines |
//! | `payments` | `payment_id` | `Payment` | Payment records |
//! | `shipments` | `shipment_id` | `Shipment` | Shipment records |
//! | `stores` | `store_id` | `Store` | Stores |
//! | `products` | `store_product_id` | `StoreProduct` | Inventory counters |
//! | `carts` | `cart_id` | `Cart` | Per-store carts |
//! | `cart_index` | `(customer_id, store_id)` | `cart_id` | One cart per customer and store |
//! | `promotions` | `code` | `Promotion` | Discount codes |
//! | `redemptions` | `(code, customer_id, order_id)` | `PromotionRedemption` | Per-customer usage |
//! | `wallets` | `supplier_id` | `SupplierWallet` | Supplier wallets |
//! | `wallet_ledger` | `(wallet_id, seq)` | `WalletLedgerEntry` | Append-only ledger |
//! | `review_requests` | `request_id` | `ReviewRequest` | Cancellation / return requests |
//! | `open_requests` | `(order_id, kind)` | `request_id` | At most one open request per kind |
//! | `loyalty_points` | `customer_id` | `i64` | Loyalty point balances |
//! | `sequence_counter` | name | `u64` | Named counters (order codes) |
//! | `sweep_runs` | `daily:YYYY-MM-DD` / `monthly:YYYY-MM` | completed at | Sweep run markers |
//! | `sweep_leases` | sweep name | `SweepLease` | Scheduler leader lease |
//!
//! # Unit of work
//!
//! redb allows a single writer at a time, so every `begin_write()` transaction
//! is serializable. All read-check-then-write sequences (stock, promotion
//! counters, wallet balances) run inside one write transaction and are
//! committed together or not at all. Dropping an uncommitted transaction
//! aborts it.

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{
    Cart, Order, OrderLineItem, Payment, Promotion, PromotionRedemption, RequestKind,
    ReviewRequest, Shipment, Store, StoreProduct, SupplierWallet, WalletLedgerEntry,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

const ORDERS_TABLE: JsonTable = TableDefinition::new("orders");

/// key = order code, value = order_id
const ORDER_CODES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("order_codes");

const ORDER_LINES_TABLE: TableDefinition<(&str, u32), &[u8]> =
    TableDefinition::new("order_lines");

const PAYMENTS_TABLE: JsonTable = TableDefinition::new("payments");
const SHIPMENTS_TABLE: JsonTable = TableDefinition::new("shipments");
const STORES_TABLE: JsonTable = TableDefinition::new("stores");
const PRODUCTS_TABLE: JsonTable = TableDefinition::new("products");
const CARTS_TABLE: JsonTable = TableDefinition::new("carts");

/// key = (customer_id, store_id), value = cart_id
const CART_INDEX_TABLE: TableDefinition<(&str, &str), &str> = TableDefinition::new("cart_index");

const PROMOTIONS_TABLE: JsonTable = TableDefinition::new("promotions");

/// Row count per (code, customer) is the per-customer usage
const REDEMPTIONS_TABLE: TableDefinition<(&str, &str, &str), &[u8]> =
    TableDefinition::new("redemptions");

const WALLETS_TABLE: JsonTable = TableDefinition::new("wallets");

/// Append-only: entries are inserted, never overwritten or removed
const WALLET_LEDGER_TABLE: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("wallet_ledger");

const REVIEW_REQUESTS_TABLE: JsonTable = TableDefinition::new("review_requests");

/// key = (order_id, kind), value = request_id of the PENDING_REVIEW request
const OPEN_REQUESTS_TABLE: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("open_requests");

const LOYALTY_TABLE: TableDefinition<&str, i64> = TableDefinition::new("loyalty_points");
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

/// key = run marker, value = completion time (Unix millis)
const SWEEP_RUNS_TABLE: TableDefinition<&str, i64> = TableDefinition::new("sweep_runs");

const SWEEP_LEASES_TABLE: JsonTable = TableDefinition::new("sweep_leases");

/// Lease row held by the scheduler instance running a sweep
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct SweepLease {
    pub holder: String,
    pub acquired_at: i64,
    pub expires_at: i64,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Settlement storage backed by redb
#[derive(Clone)]
pub struct SettlementStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for SettlementStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementStorage").finish_non_exhaustive()
    }
}

impl SettlementStorage {
    /// Open or create the database at the given path
    ///
    /// redb commits with `Durability::Immediate` by default: once `commit()`
    /// returns the write is on disk, and the copy-on-write file is always in a
    /// consistent state after a crash.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and ephemeral runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            // Create all tables if they don't exist
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_CODES_TABLE)?;
            let _ = write_txn.open_table(ORDER_LINES_TABLE)?;
            let _ = write_txn.open_table(PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(SHIPMENTS_TABLE)?;
            let _ = write_txn.open_table(STORES_TABLE)?;
            let _ = write_txn.open_table(PRODUCTS_TABLE)?;
            let _ = write_txn.open_table(CARTS_TABLE)?;
            let _ = write_txn.open_table(CART_INDEX_TABLE)?;
            let _ = write_txn.open_table(PROMOTIONS_TABLE)?;
            let _ = write_txn.open_table(REDEMPTIONS_TABLE)?;
            let _ = write_txn.open_table(WALLETS_TABLE)?;
            let _ = write_txn.open_table(WALLET_LEDGER_TABLE)?;
            let _ = write_txn.open_table(REVIEW_REQUESTS_TABLE)?;
            let _ = write_txn.open_table(OPEN_REQUESTS_TABLE)?;
            let _ = write_txn.open_table(LOYALTY_TABLE)?;
            let _ = write_txn.open_table(SEQUENCE_TABLE)?;
            let _ = write_txn.open_table(SWEEP_RUNS_TABLE)?;
            let _ = write_txn.open_table(SWEEP_LEASES_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction (blocks while another writer is active)
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Begin a read transaction (consistent snapshot)
    pub fn begin_read(&self) -> StorageResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    // ========== Generic JSON helpers ==========

    fn get_json_txn<T: DeserializeOwned>(
        txn: &WriteTransaction,
        def: JsonTable,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let table = txn.open_table(def)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(def)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn put_json_txn<T: Serialize>(
        txn: &WriteTransaction,
        def: JsonTable,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(def)?;
        let bytes = serde_json::to_vec(value)?;
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn list_json<T: DeserializeOwned>(&self, def: JsonTable) -> StorageResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(def)?;
        let mut values = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            values.push(serde_json::from_slice(value.value())?);
        }
        Ok(values)
    }

    // ========== Sequence Operations ==========

    /// Increment and return the named counter (within transaction)
    pub fn increment_sequence_txn(&self, txn: &WriteTransaction, name: &str) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table.get(name)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(name, next)?;
        Ok(next)
    }

    // ========== Orders ==========

    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        self.get_json(ORDERS_TABLE, order_id)
    }

    pub fn get_order_txn(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<Option<Order>> {
        Self::get_json_txn(txn, ORDERS_TABLE, order_id)
    }

    pub fn store_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        Self::put_json_txn(txn, ORDERS_TABLE, &order.id, order)
    }

    /// Resolve an order id from its human-readable code
    pub fn find_order_by_code(&self, code: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDER_CODES_TABLE)?;
        Ok(table.get(code)?.map(|guard| guard.value().to_string()))
    }

    /// Register a code, returns false if it is already taken
    pub fn register_order_code(
        &self,
        txn: &WriteTransaction,
        code: &str,
        order_id: &str,
    ) -> StorageResult<bool> {
        let mut table = txn.open_table(ORDER_CODES_TABLE)?;
        if table.get(code)?.is_some() {
            return Ok(false);
        }
        table.insert(code, order_id)?;
        Ok(true)
    }

    pub fn store_order_line(&self, txn: &WriteTransaction, line: &OrderLineItem) -> StorageResult<()> {
        let mut table = txn.open_table(ORDER_LINES_TABLE)?;
        let value = serde_json::to_vec(line)?;
        table.insert((line.order_id.as_str(), line.line_no), value.as_slice())?;
        Ok(())
    }

    pub fn get_order_lines(&self, order_id: &str) -> StorageResult<Vec<OrderLineItem>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDER_LINES_TABLE)?;
        let mut lines = Vec::new();
        for result in table.range((order_id, 0u32)..=(order_id, u32::MAX))? {
            let (_key, value) = result?;
            lines.push(serde_json::from_slice(value.value())?);
        }
        Ok(lines)
    }

    pub fn get_order_lines_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Vec<OrderLineItem>> {
        let table = txn.open_table(ORDER_LINES_TABLE)?;
        let mut lines = Vec::new();
        for result in table.range((order_id, 0u32)..=(order_id, u32::MAX))? {
            let (_key, value) = result?;
            lines.push(serde_json::from_slice(value.value())?);
        }
        Ok(lines)
    }

    pub fn count_orders(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        Ok(table.len()?)
    }

    // ========== Payments / Shipments ==========

    pub fn get_payment(&self, payment_id: &str) -> StorageResult<Option<Payment>> {
        self.get_json(PAYMENTS_TABLE, payment_id)
    }

    pub fn get_payment_txn(
        &self,
        txn: &WriteTransaction,
        payment_id: &str,
    ) -> StorageResult<Option<Payment>> {
        Self::get_json_txn(txn, PAYMENTS_TABLE, payment_id)
    }

    pub fn store_payment(&self, txn: &WriteTransaction, payment: &Payment) -> StorageResult<()> {
        Self::put_json_txn(txn, PAYMENTS_TABLE, &payment.id, payment)
    }

    pub fn get_shipment(&self, shipment_id: &str) -> StorageResult<Option<Shipment>> {
        self.get_json(SHIPMENTS_TABLE, shipment_id)
    }

    pub fn get_shipment_txn(
        &self,
        txn: &WriteTransaction,
        shipment_id: &str,
    ) -> StorageResult<Option<Shipment>> {
        Self::get_json_txn(txn, SHIPMENTS_TABLE, shipment_id)
    }

    pub fn store_shipment(&self, txn: &WriteTransaction, shipment: &Shipment) -> StorageResult<()> {
        Self::put_json_txn(txn, SHIPMENTS_TABLE, &shipment.id, shipment)
    }

    // ========== Stores / Products ==========

    pub fn get_store(&self, store_id: &str) -> StorageResult<Option<Store>> {
        self.get_json(STORES_TABLE, store_id)
    }

    pub fn get_store_txn(&self, txn: &WriteTransaction, store_id: &str) -> StorageResult<Option<Store>> {
        Self::get_json_txn(txn, STORES_TABLE, store_id)
    }

    pub fn store_store(&self, txn: &WriteTransaction, store: &Store) -> StorageResult<()> {
        Self::put_json_txn(txn, STORES_TABLE, &store.id, store)
    }

    pub fn get_product(&self, product_id: &str) -> StorageResult<Option<StoreProduct>> {
        self.get_json(PRODUCTS_TABLE, product_id)
    }

    pub fn get_product_txn(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
    ) -> StorageResult<Option<StoreProduct>> {
        Self::get_json_txn(txn, PRODUCTS_TABLE, product_id)
    }

    pub fn store_product(&self, txn: &WriteTransaction, product: &StoreProduct) -> StorageResult<()> {
        Self::put_json_txn(txn, PRODUCTS_TABLE, &product.id, product)
    }

    // ========== Carts ==========

    pub fn get_cart(&self, cart_id: &str) -> StorageResult<Option<Cart>> {
        self.get_json(CARTS_TABLE, cart_id)
    }

    pub fn get_cart_txn(&self, txn: &WriteTransaction, cart_id: &str) -> StorageResult<Option<Cart>> {
        Self::get_json_txn(txn, CARTS_TABLE, cart_id)
    }

    pub fn find_cart_id(&self, customer_id: &str, store_id: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CART_INDEX_TABLE)?;
        Ok(table
            .get((customer_id, store_id))?
            .map(|guard| guard.value().to_string()))
    }

    pub fn find_cart_id_txn(
        &self,
        txn: &WriteTransaction,
        customer_id: &str,
        store_id: &str,
    ) -> StorageResult<Option<String>> {
        let table = txn.open_table(CART_INDEX_TABLE)?;
        Ok(table
            .get((customer_id, store_id))?
            .map(|guard| guard.value().to_string()))
    }

    /// Store a cart and keep the (customer, store) index pointing at it
    pub fn store_cart(&self, txn: &WriteTransaction, cart: &Cart) -> StorageResult<()> {
        Self::put_json_txn(txn, CARTS_TABLE, &cart.id, cart)?;
        let mut index = txn.open_table(CART_INDEX_TABLE)?;
        index.insert((cart.customer_id.as_str(), cart.store_id.as_str()), cart.id.as_str())?;
        Ok(())
    }

    pub fn delete_cart(&self, txn: &WriteTransaction, cart: &Cart) -> StorageResult<()> {
        {
            let mut table = txn.open_table(CARTS_TABLE)?;
            table.remove(cart.id.as_str())?;
        }
        let mut index = txn.open_table(CART_INDEX_TABLE)?;
        index.remove((cart.customer_id.as_str(), cart.store_id.as_str()))?;
        Ok(())
    }

    // ========== Promotions ==========

    pub fn get_promotion(&self, code: &str) -> StorageResult<Option<Promotion>> {
        self.get_json(PROMOTIONS_TABLE, code)
    }

    pub fn get_promotion_txn(
        &self,
        txn: &WriteTransaction,
        code: &str,
    ) -> StorageResult<Option<Promotion>> {
        Self::get_json_txn(txn, PROMOTIONS_TABLE, code)
    }

    pub fn store_promotion(&self, txn: &WriteTransaction, promotion: &Promotion) -> StorageResult<()> {
        Self::put_json_txn(txn, PROMOTIONS_TABLE, &promotion.code, promotion)
    }

    pub fn list_promotions(&self) -> StorageResult<Vec<Promotion>> {
        self.list_json(PROMOTIONS_TABLE)
    }

    pub fn insert_redemption(
        &self,
        txn: &WriteTransaction,
        redemption: &PromotionRedemption,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(REDEMPTIONS_TABLE)?;
        let value = serde_json::to_vec(redemption)?;
        table.insert(
            (
                redemption.promotion_code.as_str(),
                redemption.customer_id.as_str(),
                redemption.order_id.as_str(),
            ),
            value.as_slice(),
        )?;
        Ok(())
    }

    /// Remove a redemption row, returns it if it existed
    pub fn remove_redemption(
        &self,
        txn: &WriteTransaction,
        code: &str,
        customer_id: &str,
        order_id: &str,
    ) -> StorageResult<Option<PromotionRedemption>> {
        let mut table = txn.open_table(REDEMPTIONS_TABLE)?;
        let removed = table.remove((code, customer_id, order_id))?;
        match removed {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Redemption rows for one (promotion, customer) pair
    pub fn count_customer_redemptions_txn(
        &self,
        txn: &WriteTransaction,
        code: &str,
        customer_id: &str,
    ) -> StorageResult<u32> {
        let table = txn.open_table(REDEMPTIONS_TABLE)?;
        let mut count = 0;
        for result in table.range((code, customer_id, "")..)? {
            let (key, _value) = result?;
            let (k_code, k_customer, _) = key.value();
            if k_code != code || k_customer != customer_id {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// All redemption rows for a promotion
    pub fn list_redemptions(&self, code: &str) -> StorageResult<Vec<PromotionRedemption>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REDEMPTIONS_TABLE)?;
        let mut rows = Vec::new();
        for result in table.range((code, "", "")..)? {
            let (key, value) = result?;
            if key.value().0 != code {
                break;
            }
            rows.push(serde_json::from_slice(value.value())?);
        }
        Ok(rows)
    }

    // ========== Wallets / Ledger ==========

    pub fn get_wallet(&self, supplier_id: &str) -> StorageResult<Option<SupplierWallet>> {
        self.get_json(WALLETS_TABLE, supplier_id)
    }

    pub fn get_wallet_txn(
        &self,
        txn: &WriteTransaction,
        supplier_id: &str,
    ) -> StorageResult<Option<SupplierWallet>> {
        Self::get_json_txn(txn, WALLETS_TABLE, supplier_id)
    }

    pub fn store_wallet(&self, txn: &WriteTransaction, wallet: &SupplierWallet) -> StorageResult<()> {
        Self::put_json_txn(txn, WALLETS_TABLE, &wallet.supplier_id, wallet)
    }

    /// Supplier ids of every wallet, in key order
    pub fn list_wallet_suppliers(&self) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS_TABLE)?;
        let mut ids = Vec::new();
        for result in table.iter()? {
            let (key, _value) = result?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    pub fn append_ledger_entry(
        &self,
        txn: &WriteTransaction,
        entry: &WalletLedgerEntry,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(WALLET_LEDGER_TABLE)?;
        let key = (entry.wallet_id.as_str(), entry.seq);
        debug_assert!(table.get(key)?.is_none(), "ledger entry overwritten");
        let value = serde_json::to_vec(entry)?;
        table.insert(key, value.as_slice())?;
        Ok(())
    }

    /// Ledger entries of one wallet in sequence order
    pub fn get_ledger_entries(&self, wallet_id: &str) -> StorageResult<Vec<WalletLedgerEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLET_LEDGER_TABLE)?;
        let mut entries = Vec::new();
        for result in table.range((wallet_id, 0u64)..=(wallet_id, u64::MAX))? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    // ========== Review Requests ==========

    pub fn get_request(&self, request_id: &str) -> StorageResult<Option<ReviewRequest>> {
        self.get_json(REVIEW_REQUESTS_TABLE, request_id)
    }

    pub fn get_request_txn(
        &self,
        txn: &WriteTransaction,
        request_id: &str,
    ) -> StorageResult<Option<ReviewRequest>> {
        Self::get_json_txn(txn, REVIEW_REQUESTS_TABLE, request_id)
    }

    pub fn store_request(&self, txn: &WriteTransaction, request: &ReviewRequest) -> StorageResult<()> {
        Self::put_json_txn(txn, REVIEW_REQUESTS_TABLE, &request.id, request)
    }

    pub fn get_open_request(&self, order_id: &str, kind: RequestKind) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OPEN_REQUESTS_TABLE)?;
        Ok(table
            .get((order_id, kind.as_str()))?
            .map(|guard| guard.value().to_string()))
    }

    pub fn get_open_request_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        kind: RequestKind,
    ) -> StorageResult<Option<String>> {
        let table = txn.open_table(OPEN_REQUESTS_TABLE)?;
        Ok(table
            .get((order_id, kind.as_str()))?
            .map(|guard| guard.value().to_string()))
    }

    pub fn set_open_request(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        kind: RequestKind,
        request_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(OPEN_REQUESTS_TABLE)?;
        table.insert((order_id, kind.as_str()), request_id)?;
        Ok(())
    }

    pub fn clear_open_request(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        kind: RequestKind,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(OPEN_REQUESTS_TABLE)?;
        table.remove((order_id, kind.as_str()))?;
        Ok(())
    }

    // ========== Loyalty ==========

    pub fn get_loyalty_points(&self, customer_id: &str) -> StorageResult<i64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOYALTY_TABLE)?;
        Ok(table.get(customer_id)?.map(|guard| guard.value()).unwrap_or(0))
    }

    /// Apply a signed delta to a customer's points, returns the new balance
    pub fn add_loyalty_points(
        &self,
        txn: &WriteTransaction,
        customer_id: &str,
        delta: i64,
    ) -> StorageResult<i64> {
        let mut table = txn.open_table(LOYALTY_TABLE)?;
        let current = table.get(customer_id)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current + delta;
        table.insert(customer_id, next)?;
        Ok(next)
    }

    // ========== Sweep Runs / Leases ==========

    pub fn is_sweep_done(&self, marker: &str) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SWEEP_RUNS_TABLE)?;
        Ok(table.get(marker)?.is_some())
    }

    pub fn mark_sweep_done(&self, marker: &str, completed_at: i64) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SWEEP_RUNS_TABLE)?;
            table.insert(marker, completed_at)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_lease_txn(&self, txn: &WriteTransaction, name: &str) -> StorageResult<Option<SweepLease>> {
        Self::get_json_txn(txn, SWEEP_LEASES_TABLE, name)
    }

    pub fn store_lease(&self, txn: &WriteTransaction, name: &str, lease: &SweepLease) -> StorageResult<()> {
        Self::put_json_txn(txn, SWEEP_LEASES_TABLE, name, lease)
    }

    pub fn delete_lease(&self, txn: &WriteTransaction, name: &str) -> StorageResult<()> {
        let mut table = txn.open_table(SWEEP_LEASES_TABLE)?;
        table.remove(name)?;
        Ok(())
    }
}
