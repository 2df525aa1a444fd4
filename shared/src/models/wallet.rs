//! Supplier wallet and its append-only ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    #[default]
    Active,
    /// Still accrues credits, skipped by settlement sweeps
    Frozen,
}

/// One wallet per supplier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierWallet {
    pub id: String,
    pub supplier_id: String,
    pub available_balance: Decimal,
    pub pending_balance: Decimal,
    pub total_earnings: Decimal,
    pub total_withdrawn: Decimal,
    pub total_refunded: Decimal,
    pub month_earnings: Decimal,
    /// Month the `month_earnings` counter belongs to, `YYYY-MM`
    pub month_label: String,
    pub status: WalletStatus,
    /// Overrides the platform commission rate when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_rate: Option<Decimal>,
    /// Sequence number for the next ledger entry
    pub next_entry_seq: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SupplierWallet {
    /// `available + pending == earnings - withdrawn - refunded`
    pub fn is_balanced(&self) -> bool {
        self.available_balance + self.pending_balance
            == self.total_earnings - self.total_withdrawn - self.total_refunded
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    /// Net order amount credited to pending
    OrderCredit,
    /// Informational: commission withheld from an order credit
    CommissionDeduction,
    /// Net amount taken back after a reversal
    RefundDebit,
    /// End-of-day move pending → available
    DailyRelease,
    /// End-of-month payout of available
    MonthlyWithdrawal,
}

/// Immutable record of one balance-affecting event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletLedgerEntry {
    pub wallet_id: String,
    pub seq: u64,
    pub entry_type: LedgerEntryType,
    /// Signed amount (credits positive, debits negative)
    pub amount: Decimal,
    pub available_after: Decimal,
    pub pending_after: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub description: String,
    pub created_at: i64,
}
