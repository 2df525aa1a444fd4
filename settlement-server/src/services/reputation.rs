//! Customer reputation / suspension

use super::CollaboratorError;
use dashmap::DashMap;

/// Receives customer-fault cancellations
pub trait ReputationService: Send + Sync {
    fn record_cancellation_fault(&self, customer_id: &str) -> Result<(), CollaboratorError>;
}

/// In-process fault counter
///
/// Customers reaching `threshold` faults are reported as suspended.
#[derive(Debug)]
pub struct FaultCounter {
    faults: DashMap<String, u32>,
    threshold: u32,
}

impl FaultCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            faults: DashMap::new(),
            threshold: threshold.max(1),
        }
    }

    pub fn fault_count(&self, customer_id: &str) -> u32 {
        self.faults.get(customer_id).map(|v| *v).unwrap_or(0)
    }

    pub fn is_suspended(&self, customer_id: &str) -> bool {
        self.fault_count(customer_id) >= self.threshold
    }
}

impl ReputationService for FaultCounter {
    fn record_cancellation_fault(&self, customer_id: &str) -> Result<(), CollaboratorError> {
        let count = {
            let mut entry = self.faults.entry(customer_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if count == self.threshold {
            tracing::warn!(customer_id = %customer_id, faults = count, "Customer reached suspension threshold");
        } else {
            tracing::info!(customer_id = %customer_id, faults = count, "Cancellation fault recorded");
        }
        Ok(())
    }
}
