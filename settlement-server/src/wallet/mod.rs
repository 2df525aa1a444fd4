//! Supplier wallets and settlement
//!
//! - [`ledger`] - balances plus the append-only ledger
//! - [`lease`] - single-leader lock for sweeps
//! - [`sweep`] - daily release / monthly withdrawal batches
//! - [`scheduler`] - async loop driving the sweeps

pub mod lease;
pub mod ledger;
pub mod scheduler;
pub mod sweep;

pub use lease::{RedbSweepLock, SWEEP_LEASE, SweepLock};
pub use ledger::{Balances, DebitOutcome, LedgerReplay, WalletLedger};
pub use scheduler::SettlementScheduler;
pub use sweep::{SettlementSweeper, SweepKind, SweepOutcome, SweepReport};
