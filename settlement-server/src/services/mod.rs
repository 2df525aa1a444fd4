//! 外部协作方
//!
//! The engine talks to the outside world through three narrow traits:
//!
//! - [`NotificationSink`] - best-effort user notifications
//! - [`PaymentGateway`] - refunds of captured payments
//! - [`ReputationService`] - customer-fault violations
//!
//! All are synchronous and invoked only after the owning transaction has
//! committed.

pub mod notification;
pub mod payment;
pub mod reputation;

use std::sync::Arc;

pub use notification::{
    InMemoryNotifier, Notification, NotificationKind, NotificationSink, TracingNotifier,
};
pub use payment::{ManualRefundGateway, PaymentGateway};
pub use reputation::{FaultCounter, ReputationService};

/// Errors reported by collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    /// Remote side not reachable (retry later)
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Remote side refused the request
    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Collaborator handles shared by the engine components
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn NotificationSink>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub reputation: Arc<dyn ReputationService>,
}

impl Collaborators {
    /// In-process defaults: tracing notifier, manual refunds, local fault counter
    pub fn local(fault_threshold: u32) -> Self {
        Self {
            notifier: Arc::new(TracingNotifier),
            gateway: Arc::new(ManualRefundGateway),
            reputation: Arc::new(FaultCounter::new(fault_threshold)),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("notifier", &self.notifier.name())
            .field("gateway", &self.gateway.name())
            .field("reputation", &"<dyn ReputationService>")
            .finish()
    }
}
