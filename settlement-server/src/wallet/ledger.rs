//! Supplier wallet ledger
//!
//! Every balance change is written together with its ledger entry inside the
//! caller's write transaction. Entries carry the resulting balances, so the
//! wallet can always be rebuilt from its ledger (see [`WalletLedger::replay_ledger`]).
//!
//! ```text
//! DELIVERED    pending   += net        OrderCredit(+net), CommissionDeduction(-commission)
//! reversal     pending/available -= net  RefundDebit(-net)
//! daily        pending   → available   DailyRelease(+amount)
//! monthly      available → withdrawn   MonthlyWithdrawal(-amount)
//! ```

use std::sync::Arc;

use chrono_tz::Tz;
use redb::WriteTransaction;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{
    LedgerEntryType, Order, OrderSettlement, SupplierWallet, WalletLedgerEntry, WalletStatus,
};
use shared::util::{new_id, round_money};

use crate::auth::Actor;
use crate::core::error::{SettlementError, SettlementResult};
use crate::storage::SettlementStorage;
use crate::utils::Clock;
use crate::utils::time::{business_date, month_label};

/// Spendable balances of a wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub available: Decimal,
    pub pending: Decimal,
}

impl Balances {
    fn of(wallet: &SupplierWallet) -> Self {
        Self {
            available: wallet.available_balance,
            pending: wallet.pending_balance,
        }
    }

    /// Apply one ledger entry
    ///
    /// Refund debits drain pending first and take the rest from available,
    /// which may go negative (recovered from future credits).
    pub fn apply(&mut self, entry_type: LedgerEntryType, amount: Decimal) {
        match entry_type {
            LedgerEntryType::OrderCredit => self.pending += amount,
            LedgerEntryType::CommissionDeduction => {}
            LedgerEntryType::RefundDebit => {
                let debit = -amount;
                let from_pending = debit.min(self.pending.max(Decimal::ZERO));
                self.pending -= from_pending;
                self.available -= debit - from_pending;
            }
            LedgerEntryType::DailyRelease => {
                self.pending -= amount;
                self.available += amount;
            }
            LedgerEntryType::MonthlyWithdrawal => self.available += amount,
        }
    }
}

/// Result of rebuilding a wallet from its ledger
#[derive(Debug, Clone, Serialize)]
pub struct LedgerReplay {
    pub supplier_id: String,
    pub entries: usize,
    pub replayed: Balances,
    pub stored: Balances,
    /// Human-readable description of every discrepancy found
    pub mismatches: Vec<String>,
}

impl LedgerReplay {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// What a reversal took back from the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebitOutcome {
    pub net_amount: Decimal,
    pub from_pending: Decimal,
    pub from_available: Decimal,
}

#[derive(Clone)]
pub struct WalletLedger {
    storage: SettlementStorage,
    clock: Arc<dyn Clock>,
    default_commission_rate: Decimal,
    tz: Tz,
}

impl WalletLedger {
    pub fn new(
        storage: SettlementStorage,
        clock: Arc<dyn Clock>,
        default_commission_rate: Decimal,
        tz: Tz,
    ) -> Self {
        Self {
            storage,
            clock,
            default_commission_rate,
            tz,
        }
    }

    // ========== Admin ==========

    /// Create the wallet of an approved supplier
    pub fn open_wallet(&self, actor: &Actor, supplier_id: &str) -> SettlementResult<SupplierWallet> {
        actor.require_privileged()?;
        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;
        if self.storage.get_wallet_txn(&txn, supplier_id)?.is_some() {
            return Err(SettlementError::AlreadyExists(format!("wallet of {supplier_id}")));
        }
        let wallet = self.new_wallet(supplier_id, now);
        self.storage.store_wallet(&txn, &wallet)?;
        txn.commit()?;

        tracing::info!(supplier_id = %supplier_id, wallet_id = %wallet.id, "Wallet opened");
        Ok(wallet)
    }

    pub fn get_wallet(&self, actor: &Actor, supplier_id: &str) -> SettlementResult<SupplierWallet> {
        if !actor.is_privileged() && actor.user_id != supplier_id {
            return Err(SettlementError::UnauthorizedAccess(format!(
                "wallet of {supplier_id}"
            )));
        }
        self.load_wallet(supplier_id)
    }

    pub fn ledger_entries(
        &self,
        actor: &Actor,
        supplier_id: &str,
    ) -> SettlementResult<Vec<WalletLedgerEntry>> {
        let wallet = self.get_wallet(actor, supplier_id)?;
        Ok(self.storage.get_ledger_entries(&wallet.id)?)
    }

    /// Freeze or unfreeze a wallet
    pub fn set_status(
        &self,
        actor: &Actor,
        supplier_id: &str,
        status: WalletStatus,
    ) -> SettlementResult<SupplierWallet> {
        actor.require_privileged()?;
        self.update_wallet(supplier_id, |wallet| {
            wallet.status = status;
            Ok(())
        })
        .inspect(|_| tracing::info!(supplier_id = %supplier_id, status = ?status, "Wallet status changed"))
    }

    /// Override the commission rate for one supplier (`None` restores the default)
    pub fn set_commission_rate(
        &self,
        actor: &Actor,
        supplier_id: &str,
        rate: Option<Decimal>,
    ) -> SettlementResult<SupplierWallet> {
        actor.require_privileged()?;
        if let Some(r) = rate
            && (r.is_sign_negative() || r > Decimal::ONE)
        {
            return Err(SettlementError::InvalidInput(format!(
                "commission rate must be within [0, 1], got {r}"
            )));
        }
        self.update_wallet(supplier_id, |wallet| {
            wallet.commission_rate = rate;
            Ok(())
        })
    }

    // ========== Order events ==========

    /// Credit a delivered order's net amount to the supplier's pending balance
    ///
    /// Writes the order-credit and commission-deduction entries and returns
    /// the settlement to be stored on the order. A supplier without a wallet
    /// gets one on the spot.
    pub fn credit_order_txn(
        &self,
        txn: &WriteTransaction,
        order: &Order,
        now: i64,
    ) -> SettlementResult<OrderSettlement> {
        let mut wallet = match self.storage.get_wallet_txn(txn, &order.supplier_id)? {
            Some(w) => w,
            None => {
                tracing::warn!(supplier_id = %order.supplier_id, order_id = %order.id, "No wallet for supplier, opening one");
                self.new_wallet(&order.supplier_id, now)
            }
        };
        self.roll_month(&mut wallet, now);

        let rate = wallet.commission_rate.unwrap_or(self.default_commission_rate);
        let (commission, net) = crate::orders::money::commission_split(order.total_amount, rate);

        let mut balances = Balances::of(&wallet);
        balances.apply(LedgerEntryType::OrderCredit, net);
        wallet.total_earnings += net;
        wallet.month_earnings += net;

        self.append(
            txn,
            &mut wallet,
            balances,
            LedgerEntryType::OrderCredit,
            net,
            Some(&order.id),
            format!("Order {} delivered", order.code),
            now,
        )?;
        self.append(
            txn,
            &mut wallet,
            balances,
            LedgerEntryType::CommissionDeduction,
            -commission,
            Some(&order.id),
            format!("Commission {} on order {}", rate, order.code),
            now,
        )?;
        self.storage.store_wallet(txn, &wallet)?;

        tracing::info!(
            supplier_id = %order.supplier_id,
            order_id = %order.id,
            net = %net,
            commission = %commission,
            pending = %wallet.pending_balance,
            "Wallet credited"
        );
        Ok(OrderSettlement {
            commission_rate: rate,
            commission_amount: commission,
            net_amount: net,
            credited_at: now,
            reversed_at: None,
        })
    }

    /// Take back what [`credit_order_txn`](Self::credit_order_txn) credited
    ///
    /// No-op (returns `None`) for orders never credited or already reversed.
    /// Marks the order's settlement reversed.
    pub fn debit_order_txn(
        &self,
        txn: &WriteTransaction,
        order: &mut Order,
        now: i64,
    ) -> SettlementResult<Option<DebitOutcome>> {
        let Some(settlement) = order.settlement.as_mut() else {
            return Ok(None);
        };
        if settlement.reversed_at.is_some() {
            tracing::debug!(order_id = %order.id, "Settlement already reversed");
            return Ok(None);
        }

        let mut wallet = self
            .storage
            .get_wallet_txn(txn, &order.supplier_id)?
            .ok_or_else(|| SettlementError::WalletNotFound(order.supplier_id.clone()))?;
        self.roll_month(&mut wallet, now);

        let net = settlement.net_amount;
        let before = Balances::of(&wallet);
        let mut balances = before;
        balances.apply(LedgerEntryType::RefundDebit, -net);
        wallet.total_refunded += net;
        wallet.month_earnings = (wallet.month_earnings - net).max(Decimal::ZERO);

        self.append(
            txn,
            &mut wallet,
            balances,
            LedgerEntryType::RefundDebit,
            -net,
            Some(&order.id),
            format!("Order {} reversed", order.code),
            now,
        )?;
        self.storage.store_wallet(txn, &wallet)?;
        settlement.reversed_at = Some(now);

        let outcome = DebitOutcome {
            net_amount: net,
            from_pending: before.pending - balances.pending,
            from_available: before.available - balances.available,
        };
        if balances.available.is_sign_negative() {
            tracing::warn!(
                supplier_id = %order.supplier_id,
                available = %balances.available,
                "Wallet available balance negative after refund debit"
            );
        }
        tracing::info!(
            supplier_id = %order.supplier_id,
            order_id = %order.id,
            net = %net,
            "Wallet debited"
        );
        Ok(Some(outcome))
    }

    // ========== Sweeps ==========

    /// Move all pending to available; `None` when skipped
    pub fn release_txn(
        &self,
        txn: &WriteTransaction,
        supplier_id: &str,
        now: i64,
    ) -> SettlementResult<Option<Decimal>> {
        let mut wallet = self
            .storage
            .get_wallet_txn(txn, supplier_id)?
            .ok_or_else(|| SettlementError::WalletNotFound(supplier_id.to_string()))?;
        if wallet.status == WalletStatus::Frozen || wallet.pending_balance <= Decimal::ZERO {
            return Ok(None);
        }

        let amount = wallet.pending_balance;
        let mut balances = Balances::of(&wallet);
        balances.apply(LedgerEntryType::DailyRelease, amount);
        self.append(
            txn,
            &mut wallet,
            balances,
            LedgerEntryType::DailyRelease,
            amount,
            None,
            "End-of-day release".to_string(),
            now,
        )?;
        self.storage.store_wallet(txn, &wallet)?;
        Ok(Some(amount))
    }

    /// Pay out all available and start the new month; `None` when skipped
    pub fn withdraw_txn(
        &self,
        txn: &WriteTransaction,
        supplier_id: &str,
        now: i64,
    ) -> SettlementResult<Option<Decimal>> {
        let mut wallet = self
            .storage
            .get_wallet_txn(txn, supplier_id)?
            .ok_or_else(|| SettlementError::WalletNotFound(supplier_id.to_string()))?;
        // Frozen wallets keep their balance but still start the new month
        let changed_month = self.roll_month(&mut wallet, now);
        let amount = wallet.available_balance;
        if wallet.status == WalletStatus::Frozen || amount <= Decimal::ZERO {
            if changed_month {
                wallet.updated_at = now;
                self.storage.store_wallet(txn, &wallet)?;
            }
            return Ok(None);
        }

        let mut balances = Balances::of(&wallet);
        balances.apply(LedgerEntryType::MonthlyWithdrawal, -amount);
        wallet.total_withdrawn += amount;
        self.append(
            txn,
            &mut wallet,
            balances,
            LedgerEntryType::MonthlyWithdrawal,
            -amount,
            None,
            "End-of-month withdrawal".to_string(),
            now,
        )?;
        self.storage.store_wallet(txn, &wallet)?;
        Ok(Some(amount))
    }

    // ========== Reconciliation ==========

    /// Rebuild balances and totals from the ledger and compare with the wallet
    pub fn replay_ledger(&self, supplier_id: &str) -> SettlementResult<LedgerReplay> {
        let wallet = self.load_wallet(supplier_id)?;
        let entries = self.storage.get_ledger_entries(&wallet.id)?;

        let mut mismatches = Vec::new();
        let mut balances = Balances::default();
        let (mut earnings, mut refunded, mut withdrawn) =
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);

        for (expected_seq, entry) in (0u64..).zip(entries.iter()) {
            if entry.seq != expected_seq {
                mismatches.push(format!("gap in ledger: expected seq {expected_seq}, found {}", entry.seq));
            }
            balances.apply(entry.entry_type, entry.amount);
            match entry.entry_type {
                LedgerEntryType::OrderCredit => earnings += entry.amount,
                LedgerEntryType::RefundDebit => refunded -= entry.amount,
                LedgerEntryType::MonthlyWithdrawal => withdrawn -= entry.amount,
                LedgerEntryType::CommissionDeduction | LedgerEntryType::DailyRelease => {}
            }
            if balances.available != entry.available_after || balances.pending != entry.pending_after {
                mismatches.push(format!(
                    "entry {}: replayed {}/{} vs recorded {}/{}",
                    entry.seq,
                    balances.available,
                    balances.pending,
                    entry.available_after,
                    entry.pending_after
                ));
            }
        }

        let stored = Balances::of(&wallet);
        if balances != stored {
            mismatches.push(format!(
                "balances: replayed {}/{} vs stored {}/{}",
                balances.available, balances.pending, stored.available, stored.pending
            ));
        }
        for (name, replayed, recorded) in [
            ("total_earnings", earnings, wallet.total_earnings),
            ("total_refunded", refunded, wallet.total_refunded),
            ("total_withdrawn", withdrawn, wallet.total_withdrawn),
        ] {
            if replayed != recorded {
                mismatches.push(format!("{name}: replayed {replayed} vs stored {recorded}"));
            }
        }
        if !wallet.is_balanced() {
            mismatches.push("available + pending != earnings - withdrawn - refunded".to_string());
        }

        if !mismatches.is_empty() {
            tracing::error!(supplier_id = %supplier_id, mismatches = ?mismatches, "Ledger replay mismatch");
        }
        Ok(LedgerReplay {
            supplier_id: supplier_id.to_string(),
            entries: entries.len(),
            replayed: balances,
            stored,
            mismatches,
        })
    }

    /// `available + pending == earnings - withdrawn - refunded` for one wallet
    pub fn verify_invariant(&self, supplier_id: &str) -> SettlementResult<bool> {
        Ok(self.load_wallet(supplier_id)?.is_balanced())
    }

    /// Replay every wallet, returns the inconsistent ones
    pub fn reconcile_all(&self) -> SettlementResult<Vec<LedgerReplay>> {
        let mut broken = Vec::new();
        for supplier_id in self.storage.list_wallet_suppliers()? {
            let replay = self.replay_ledger(&supplier_id)?;
            if !replay.is_consistent() {
                broken.push(replay);
            }
        }
        Ok(broken)
    }

    // ========== Internal ==========

    fn load_wallet(&self, supplier_id: &str) -> SettlementResult<SupplierWallet> {
        self.storage
            .get_wallet(supplier_id)?
            .ok_or_else(|| SettlementError::WalletNotFound(supplier_id.to_string()))
    }

    fn update_wallet(
        &self,
        supplier_id: &str,
        f: impl FnOnce(&mut SupplierWallet) -> SettlementResult<()>,
    ) -> SettlementResult<SupplierWallet> {
        let txn = self.storage.begin_write()?;
        let mut wallet = self
            .storage
            .get_wallet_txn(&txn, supplier_id)?
            .ok_or_else(|| SettlementError::WalletNotFound(supplier_id.to_string()))?;
        f(&mut wallet)?;
        wallet.updated_at = self.clock.now_millis();
        self.storage.store_wallet(&txn, &wallet)?;
        txn.commit()?;
        Ok(wallet)
    }

    fn new_wallet(&self, supplier_id: &str, now: i64) -> SupplierWallet {
        SupplierWallet {
            id: new_id(),
            supplier_id: supplier_id.to_string(),
            available_balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            total_earnings: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            total_refunded: Decimal::ZERO,
            month_earnings: Decimal::ZERO,
            month_label: month_label(business_date(now, self.tz)),
            status: WalletStatus::Active,
            commission_rate: None,
            next_entry_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reset the month counter when `now` is in a later month
    fn roll_month(&self, wallet: &mut SupplierWallet, now: i64) -> bool {
        let current = month_label(business_date(now, self.tz));
        if wallet.month_label < current {
            wallet.month_label = current;
            wallet.month_earnings = Decimal::ZERO;
            return true;
        }
        false
    }

    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        txn: &WriteTransaction,
        wallet: &mut SupplierWallet,
        balances: Balances,
        entry_type: LedgerEntryType,
        amount: Decimal,
        order_id: Option<&str>,
        description: String,
        now: i64,
    ) -> SettlementResult<()> {
        wallet.available_balance = round_money(balances.available);
        wallet.pending_balance = round_money(balances.pending);
        wallet.updated_at = now;

        let entry = WalletLedgerEntry {
            wallet_id: wallet.id.clone(),
            seq: wallet.next_entry_seq,
            entry_type,
            amount,
            available_after: wallet.available_balance,
            pending_after: wallet.pending_balance,
            order_id: order_id.map(str::to_string),
            description,
            created_at: now,
        };
        self.storage.append_ledger_entry(txn, &entry)?;
        wallet.next_entry_seq += 1;
        Ok(())
    }
}
