//! Payment gateway adapter

use super::CollaboratorError;

/// Refunds of captured payments
///
/// Called synchronously after the reversal has committed. A failure leaves the
/// payment in `REFUND_PENDING` and is surfaced to the caller as retryable.
pub trait PaymentGateway: Send + Sync {
    fn refund(&self, payment_id: &str) -> Result<(), CollaboratorError>;

    fn name(&self) -> &str;
}

/// Gateway for deployments without an online processor
///
/// Refunds are settled by finance out of band; the call only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualRefundGateway;

impl PaymentGateway for ManualRefundGateway {
    fn refund(&self, payment_id: &str) -> Result<(), CollaboratorError> {
        tracing::info!(payment_id = %payment_id, "Refund recorded for manual settlement");
        Ok(())
    }

    fn name(&self) -> &str {
        "manual"
    }
}
