//! Notification sink

use super::CollaboratorError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Supplier: a customer checked out
    NewOrder,
    /// Customer: order moved to a new status
    OrderStatusChanged,
    /// Supplier: cancellation / return request submitted
    RequestSubmitted,
    /// Customer: request approved or rejected
    RequestReviewed,
    /// Customer: refund confirmed by the gateway
    RefundCompleted,
    /// Supplier: wallet credited or debited
    WalletUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub link_url: Option<String>,
}

/// Fire-and-forget user notifications
///
/// Errors are logged by the caller and never roll anything back.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError>;

    fn name(&self) -> &str;
}

/// Deliver a notification, logging and swallowing failures
pub fn notify_best_effort(sink: &dyn NotificationSink, notification: &Notification) {
    if let Err(e) = sink.notify(notification) {
        tracing::warn!(
            sink = %sink.name(),
            user_id = %notification.user_id,
            kind = ?notification.kind,
            error = %e,
            "Notification delivery failed"
        );
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, n: &Notification) -> Result<(), CollaboratorError> {
        tracing::info!(
            user_id = %n.user_id,
            kind = ?n.kind,
            link = n.link_url.as_deref().unwrap_or(""),
            "{}",
            n.message
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Keeps notifications in memory (outbox for an API layer to drain)
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_to(&self, user_id: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl NotificationSink for InMemoryNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl NotificationSink for BrokenSink {
        fn notify(&self, _: &Notification) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::Unavailable("smtp down".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn sample(user: &str) -> Notification {
        Notification {
            user_id: user.to_string(),
            kind: NotificationKind::NewOrder,
            message: "New order ORD1".to_string(),
            link_url: Some("/orders/o1".to_string()),
        }
    }

    #[test]
    fn test_failure_is_swallowed() {
        notify_best_effort(&BrokenSink, &sample("u1"));
    }

    #[test]
    fn test_in_memory_outbox() {
        let sink = InMemoryNotifier::new();
        notify_best_effort(&sink, &sample("u1"));
        notify_best_effort(&sink, &sample("u2"));
        assert_eq!(sink.sent_to("u1").len(), 1);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.drain().is_empty());
    }
}
