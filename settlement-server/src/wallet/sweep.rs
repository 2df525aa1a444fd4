//! 结算批处理 (每日释放 / 每月提现)
//!
//! ```text
//! run_due(now)
//!     ├─ daily:{date}     pending → available, expire promotions
//!     └─ monthly:{prev}   (1st of month only) available → withdrawn
//! ```
//!
//! Each sweep runs under the [`SweepLock`] lease and writes a run marker when
//! done, so a period is never processed twice. Every wallet is settled in its
//! own transaction; a failing wallet is logged and the sweep moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use redb::WriteTransaction;
use rust_decimal::Decimal;
use serde::Serialize;

use super::lease::{SWEEP_LEASE, SweepLock};
use super::ledger::WalletLedger;
use crate::core::error::SettlementResult;
use crate::promotions::PromotionEngine;
use crate::storage::SettlementStorage;
use crate::utils::Clock;
use crate::utils::time::{date_label, due_sweep_date, previous_month_label};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    Daily,
    Monthly,
}

/// Per-run summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub marker: String,
    /// Wallets with money moved
    pub settled: usize,
    /// Frozen or empty wallets
    pub skipped: usize,
    /// (supplier_id, error)
    pub failures: Vec<(String, String)>,
    pub amount: Decimal,
    pub promotions_expired: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed { kind: SweepKind, report: SweepReport },
    /// Marker already written for this period
    AlreadyDone { kind: SweepKind, marker: String },
    /// Another instance holds the lease
    Locked { kind: SweepKind, marker: String },
}

#[derive(Clone)]
pub struct SettlementSweeper {
    storage: SettlementStorage,
    wallets: WalletLedger,
    promotions: PromotionEngine,
    lock: Arc<dyn SweepLock>,
    clock: Arc<dyn Clock>,
    instance_id: String,
    lease_ttl: Duration,
    tz: Tz,
    cutoff: NaiveTime,
}

pub fn daily_marker(date: NaiveDate) -> String {
    format!("daily:{}", date_label(date))
}

/// Monthly sweeps run on the 1st and close the previous month
pub fn monthly_marker(first_of_month: NaiveDate) -> String {
    format!("monthly:{}", previous_month_label(first_of_month))
}

impl SettlementSweeper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: SettlementStorage,
        wallets: WalletLedger,
        promotions: PromotionEngine,
        lock: Arc<dyn SweepLock>,
        clock: Arc<dyn Clock>,
        instance_id: impl Into<String>,
        lease_ttl: Duration,
        tz: Tz,
        cutoff: NaiveTime,
    ) -> Self {
        Self {
            storage,
            wallets,
            promotions,
            lock,
            clock,
            instance_id: instance_id.into(),
            lease_ttl,
            tz,
            cutoff,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn cutoff(&self) -> NaiveTime {
        self.cutoff
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run whatever is due at the current time
    ///
    /// Daily first, then monthly when the due date is the 1st.
    pub fn run_due(&self) -> SettlementResult<Vec<SweepOutcome>> {
        let date = due_sweep_date(self.clock.now_millis(), self.cutoff, self.tz);
        let mut outcomes = vec![self.run_daily_sweep(date)?];
        if date.day() == 1 {
            outcomes.push(self.run_monthly_sweep(date)?);
        }
        Ok(outcomes)
    }

    /// Startup catch-up: today's daily sweep plus this month's monthly sweep
    /// if the 1st was missed
    pub fn catch_up(&self) -> SettlementResult<Vec<SweepOutcome>> {
        let date = due_sweep_date(self.clock.now_millis(), self.cutoff, self.tz);
        let first = date.with_day(1).unwrap_or(date);
        Ok(vec![
            self.run_daily_sweep(date)?,
            self.run_monthly_sweep(first)?,
        ])
    }

    /// Release all pending balances for business date `date`
    pub fn run_daily_sweep(&self, date: NaiveDate) -> SettlementResult<SweepOutcome> {
        let marker = daily_marker(date);
        self.run_locked(SweepKind::Daily, marker, |sweeper, report| {
            sweeper.settle_each(report, |txn, supplier_id, now| {
                sweeper.wallets.release_txn(txn, supplier_id, now)
            })?;
            match sweeper.promotions.expire_past_window() {
                Ok(n) => report.promotions_expired = n,
                Err(e) => tracing::error!(error = %e, "Promotion expiry failed during daily sweep"),
            }
            Ok(())
        })
    }

    /// Withdraw all available balances and reset the month counters
    pub fn run_monthly_sweep(&self, first_of_month: NaiveDate) -> SettlementResult<SweepOutcome> {
        let marker = monthly_marker(first_of_month);
        self.run_locked(SweepKind::Monthly, marker, |sweeper, report| {
            sweeper.settle_each(report, |txn, supplier_id, now| {
                sweeper.wallets.withdraw_txn(txn, supplier_id, now)
            })
        })
    }

    fn run_locked(
        &self,
        kind: SweepKind,
        marker: String,
        body: impl FnOnce(&Self, &mut SweepReport) -> SettlementResult<()>,
    ) -> SettlementResult<SweepOutcome> {
        if self.storage.is_sweep_done(&marker)? {
            tracing::debug!(marker = %marker, "Sweep already done");
            return Ok(SweepOutcome::AlreadyDone { kind, marker });
        }
        if !self
            .lock
            .try_acquire(SWEEP_LEASE, &self.instance_id, self.lease_ttl)?
        {
            tracing::info!(marker = %marker, "Sweep lease held by another instance, skipping");
            return Ok(SweepOutcome::Locked { kind, marker });
        }

        let result = self.run_marked(kind, marker, body);
        if let Err(e) = self.lock.release(SWEEP_LEASE, &self.instance_id) {
            tracing::warn!(error = %e, "Failed to release sweep lease");
        }
        result
    }

    fn run_marked(
        &self,
        kind: SweepKind,
        marker: String,
        body: impl FnOnce(&Self, &mut SweepReport) -> SettlementResult<()>,
    ) -> SettlementResult<SweepOutcome> {
        // 另一实例可能在我们拿到租约前刚完成
        if self.storage.is_sweep_done(&marker)? {
            return Ok(SweepOutcome::AlreadyDone { kind, marker });
        }

        tracing::info!(marker = %marker, "Settlement sweep started");
        let mut report = SweepReport {
            marker: marker.clone(),
            ..Default::default()
        };
        body(self, &mut report)?;
        self.storage.mark_sweep_done(&marker, self.clock.now_millis())?;

        if report.failures.is_empty() {
            tracing::info!(
                marker = %marker,
                settled = report.settled,
                skipped = report.skipped,
                amount = %report.amount,
                "Settlement sweep completed"
            );
        } else {
            tracing::warn!(
                marker = %marker,
                settled = report.settled,
                failed = report.failures.len(),
                "Settlement sweep completed with failures"
            );
        }
        Ok(SweepOutcome::Completed { kind, report })
    }

    fn settle_each(
        &self,
        report: &mut SweepReport,
        settle: impl Fn(&WriteTransaction, &str, i64) -> SettlementResult<Option<Decimal>>,
    ) -> SettlementResult<()> {
        for supplier_id in self.storage.list_wallet_suppliers()? {
            match self.settle_one(&supplier_id, &settle) {
                Ok(Some(amount)) => {
                    report.settled += 1;
                    report.amount += amount;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(supplier_id = %supplier_id, error = %e, "Wallet sweep failed");
                    report.failures.push((supplier_id, e.to_string()));
                }
            }
        }
        Ok(())
    }

    fn settle_one(
        &self,
        supplier_id: &str,
        settle: &impl Fn(&WriteTransaction, &str, i64) -> SettlementResult<Option<Decimal>>,
    ) -> SettlementResult<Option<Decimal>> {
        let txn = self.storage.begin_write()?;
        let moved = settle(&txn, supplier_id, self.clock.now_millis())?;
        txn.commit()?;
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Actor;
    use crate::utils::ManualClock;
    use crate::wallet::lease::RedbSweepLock;
    use rust_decimal_macros::dec;
    use shared::models::{LedgerEntryType, Order, OrderStatus, PaymentStatus, ShippingAddress, WalletStatus};

    struct Fixture {
        sweeper: SettlementSweeper,
        wallets: WalletLedger,
        storage: SettlementStorage,
        clock: Arc<ManualClock>,
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup(instance: &str, storage: SettlementStorage, clock: Arc<ManualClock>) -> Fixture {
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let wallets = WalletLedger::new(storage.clone(), dyn_clock.clone(), dec!(0.10), chrono_tz::UTC);
        let promotions = PromotionEngine::new(storage.clone(), dyn_clock.clone());
        let lock = Arc::new(RedbSweepLock::new(storage.clone(), dyn_clock.clone()));
        let sweeper = SettlementSweeper::new(
            storage.clone(),
            wallets.clone(),
            promotions,
            lock,
            dyn_clock,
            instance,
            Duration::from_secs(600),
            chrono_tz::UTC,
            NaiveTime::from_hms_opt(0, 5, 0).unwrap(),
        );
        Fixture {
            sweeper,
            wallets,
            storage,
            clock,
        }
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::at(ymd(2026, 3, 30), NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        setup("node-a", SettlementStorage::open_in_memory().unwrap(), clock)
    }

    fn credit(f: &Fixture, supplier_id: &str, total: Decimal) {
        let order = Order {
            id: shared::util::new_id(),
            code: "ORD".to_string(),
            customer_id: "c1".to_string(),
            store_id: "st".to_string(),
            supplier_id: supplier_id.to_string(),
            status: OrderStatus::Delivered,
            payment_status: PaymentStatus::Succeeded,
            subtotal: total,
            discount_amount: Decimal::ZERO,
            total_amount: total,
            shipping_address: ShippingAddress::default(),
            promotion_codes: vec![],
            payment_id: None,
            shipment_id: None,
            settlement: None,
            loyalty_points_awarded: 0,
            customer_fault: false,
            cancel_reason: None,
            created_at: 0,
            updated_at: 0,
            delivered_at: None,
        };
        let txn = f.storage.begin_write().unwrap();
        f.wallets.credit_order_txn(&txn, &order, f.clock.now_millis()).unwrap();
        txn.commit().unwrap();
    }

    fn report(outcome: SweepOutcome) -> SweepReport {
        match outcome {
            SweepOutcome::Completed { report, .. } => report,
            other => panic!("expected completed sweep, got {other:?}"),
        }
    }

    #[test]
    fn test_daily_sweep_releases_once() {
        let f = fixture();
        let admin = Actor::admin("root");
        f.wallets.open_wallet(&admin, "sup-1").unwrap();
        f.wallets.open_wallet(&admin, "sup-2").unwrap();
        credit(&f, "sup-1", dec!(100));

        let r = report(f.sweeper.run_daily_sweep(ymd(2026, 3, 30)).unwrap());
        assert_eq!(r.settled, 1);
        assert_eq!(r.skipped, 1);
        assert_eq!(r.amount, dec!(90));

        let wallet = f.wallets.get_wallet(&admin, "sup-1").unwrap();
        assert_eq!(wallet.pending_balance, dec!(0));
        assert_eq!(wallet.available_balance, dec!(90));

        credit(&f, "sup-1", dec!(10));
        assert!(matches!(
            f.sweeper.run_daily_sweep(ymd(2026, 3, 30)).unwrap(),
            SweepOutcome::AlreadyDone { .. }
        ));
        assert_eq!(f.wallets.get_wallet(&admin, "sup-1").unwrap().pending_balance, dec!(9));
    }

    #[test]
    fn test_monthly_sweep_withdraws_and_resets() {
        let f = fixture();
        let admin = Actor::admin("root");
        f.wallets.open_wallet(&admin, "sup-1").unwrap();
        f.wallets.open_wallet(&admin, "sup-frozen").unwrap();
        credit(&f, "sup-1", dec!(100));
        credit(&f, "sup-frozen", dec!(100));
        f.wallets.set_status(&admin, "sup-frozen", WalletStatus::Frozen).unwrap();

        // 1st of April after the cutoff: daily then monthly
        f.clock.set(
            ymd(2026, 4, 1)
                .and_hms_opt(0, 10, 0)
                .unwrap()
                .and_utc()
                .timestamp_millis(),
        );
        let outcomes = f.sweeper.run_due().unwrap();
        assert_eq!(outcomes.len(), 2);

        let wallet = f.wallets.get_wallet(&admin, "sup-1").unwrap();
        assert_eq!(wallet.available_balance, dec!(0));
        assert_eq!(wallet.total_withdrawn, dec!(90));
        assert_eq!(wallet.month_earnings, dec!(0));
        assert_eq!(wallet.month_label, "2026-04");
        assert!(wallet.is_balanced());

        let types: Vec<_> = f
            .wallets
            .ledger_entries(&admin, "sup-1")
            .unwrap()
            .iter()
            .map(|e| e.entry_type)
            .collect();
        assert_eq!(
            types,
            vec![
                LedgerEntryType::OrderCredit,
                LedgerEntryType::CommissionDeduction,
                LedgerEntryType::DailyRelease,
                LedgerEntryType::MonthlyWithdrawal,
            ]
        );

        let frozen = f.wallets.get_wallet(&admin, "sup-frozen").unwrap();
        assert_eq!(frozen.pending_balance, dec!(90));
        assert_eq!(frozen.total_withdrawn, dec!(0));
        // Payout skipped, month counter still rolled
        assert_eq!(frozen.month_label, "2026-04");
        assert_eq!(frozen.month_earnings, dec!(0));
        assert!(storage_marker_done(&f, "monthly:2026-03"));
    }

    fn storage_marker_done(f: &Fixture, marker: &str) -> bool {
        f.storage.is_sweep_done(marker).unwrap()
    }

    #[test]
    fn test_second_instance_cannot_double_release() {
        let clock = Arc::new(ManualClock::at(ymd(2026, 3, 30), NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        let storage = SettlementStorage::open_in_memory().unwrap();
        let a = setup("node-a", storage.clone(), clock.clone());
        let b = setup("node-b", storage, clock);
        a.wallets.open_wallet(&Actor::admin("root"), "sup-1").unwrap();
        credit(&a, "sup-1", dec!(100));

        // node-b holds the lease
        let lock = RedbSweepLock::new(b.storage.clone(), b.sweeper.clock().clone());
        assert!(lock.try_acquire(SWEEP_LEASE, "node-b", Duration::from_secs(600)).unwrap());
        assert!(matches!(
            a.sweeper.run_daily_sweep(ymd(2026, 3, 30)).unwrap(),
            SweepOutcome::Locked { .. }
        ));

        // node-b runs and finishes; node-a then sees the marker
        report(b.sweeper.run_daily_sweep(ymd(2026, 3, 30)).unwrap());
        assert!(matches!(
            a.sweeper.run_daily_sweep(ymd(2026, 3, 30)).unwrap(),
            SweepOutcome::AlreadyDone { .. }
        ));
        let entries = a.wallets.ledger_entries(&Actor::admin("root"), "sup-1").unwrap();
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.entry_type == LedgerEntryType::DailyRelease)
                .count(),
            1
        );
    }
}
