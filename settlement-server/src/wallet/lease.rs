//! Single-leader lease for settlement sweeps
//!
//! Several engine instances may share one database. A sweep only runs while
//! its instance holds the lease; an expired lease can be taken over.

use std::sync::Arc;
use std::time::Duration;

use crate::core::error::SettlementResult;
use crate::storage::{SettlementStorage, SweepLease};
use crate::utils::Clock;

/// Lease name shared by the daily and monthly sweeps
pub const SWEEP_LEASE: &str = "settlement-sweep";

pub trait SweepLock: Send + Sync {
    /// Take or renew the lease; false when another live holder has it
    fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> SettlementResult<bool>;

    /// Give the lease up if `holder` still owns it
    fn release(&self, name: &str, holder: &str) -> SettlementResult<()>;
}

/// Lease row stored in the settlement database
#[derive(Clone)]
pub struct RedbSweepLock {
    storage: SettlementStorage,
    clock: Arc<dyn Clock>,
}

impl RedbSweepLock {
    pub fn new(storage: SettlementStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }
}

impl SweepLock for RedbSweepLock {
    fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> SettlementResult<bool> {
        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;
        if let Some(current) = self.storage.get_lease_txn(&txn, name)?
            && current.holder != holder
            && current.expires_at > now
        {
            tracing::debug!(lease = %name, holder = %current.holder, expires_at = current.expires_at, "Lease held elsewhere");
            return Ok(false);
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let lease = SweepLease {
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now.saturating_add(ttl_ms),
        };
        self.storage.store_lease(&txn, name, &lease)?;
        txn.commit()?;
        tracing::debug!(lease = %name, holder = %holder, "Lease acquired");
        Ok(true)
    }

    fn release(&self, name: &str, holder: &str) -> SettlementResult<()> {
        let txn = self.storage.begin_write()?;
        match self.storage.get_lease_txn(&txn, name)? {
            Some(current) if current.holder == holder => {
                self.storage.delete_lease(&txn, name)?;
                txn.commit()?;
            }
            Some(current) => {
                tracing::warn!(lease = %name, holder = %holder, owner = %current.holder, "Lease taken over before release");
            }
            None => {}
        }
        Ok(())
    }
}
