//! Cancellation / return review requests

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Cancellation,
    Return,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Cancellation => "CANCELLATION",
            RequestKind::Return => "RETURN",
        }
    }
}

/// Review status, terminal once decided
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    #[default]
    PendingReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn is_decided(&self) -> bool {
        !matches!(self, ReviewStatus::PendingReview)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRequest {
    pub id: String,
    pub order_id: String,
    pub customer_id: String,
    pub kind: RequestKind,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<i64>,
    /// Amount the customer gets back if approved
    pub refund_amount: Decimal,
    pub created_at: i64,
}
