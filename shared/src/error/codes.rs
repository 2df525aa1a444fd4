//! Unified error codes for the settlement engine
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product / inventory errors
//! - 7xxx: Promotion errors
//! - 8xxx: Wallet / review errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 2xxx: Permission ====================
    /// Caller does not own the resource or lacks the role
    PermissionDenied = 2001,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Transition not in the allow-list
    InvalidStateTransition = 4002,
    /// Cart has no lines
    CartEmpty = 4003,
    /// Cart not found
    CartNotFound = 4004,

    // ==================== 5xxx: Payment ====================
    /// Payment record not found
    PaymentNotFound = 5001,
    /// Payment is not in a refundable state
    InvalidRefundState = 5002,
    /// Refund through the gateway failed (retryable)
    RefundFailed = 5003,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product is inactive, expired or belongs to another store
    ProductUnavailable = 6002,
    /// Product is out of stock
    InsufficientStock = 6003,
    /// Store not found
    StoreNotFound = 6101,

    // ==================== 7xxx: Promotion ====================
    /// Promotion not found
    PromotionNotFound = 7001,
    /// Promotion inactive or outside its validity window
    PromotionExpiredOrInactive = 7002,
    /// Global or per-customer usage cap reached
    PromotionExhausted = 7003,
    /// Order does not meet the promotion conditions
    PromotionNotApplicable = 7004,

    // ==================== 8xxx: Wallet / Review ====================
    /// Wallet not found
    WalletNotFound = 8001,
    /// Review request not found
    RequestNotFound = 8101,
    /// An open request already exists for the order
    RequestAlreadyOpen = 8102,
    /// Return window has elapsed
    ReturnPeriodExpired = 8103,

    // ==================== 9xxx: System ====================
    InternalError = 9001,
    DatabaseError = 9002,
    ConfigError = 9005,

    // ==================== 94xx: Storage ====================
    StorageFull = 9401,
    StorageCorrupted = 9403,
    SystemBusy = 9404,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Whether the caller may retry the same request unchanged
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RefundFailed | ErrorCode::SystemBusy | ErrorCode::DatabaseError
        )
    }

    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::InvalidStateTransition => "Invalid state transition",
            ErrorCode::CartEmpty => "Cart is empty",
            ErrorCode::CartNotFound => "Cart not found",

            // Payment
            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::InvalidRefundState => "Payment cannot be refunded in its current state",
            ErrorCode::RefundFailed => "Refund failed, please retry",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductUnavailable => "Product is not available",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::StoreNotFound => "Store not found",

            // Promotion
            ErrorCode::PromotionNotFound => "Promotion not found",
            ErrorCode::PromotionExpiredOrInactive => "Promotion is expired or inactive",
            ErrorCode::PromotionExhausted => "Promotion usage limit reached",
            ErrorCode::PromotionNotApplicable => "Promotion is not applicable to this order",

            // Wallet / Review
            ErrorCode::WalletNotFound => "Wallet not found",
            ErrorCode::RequestNotFound => "Request not found",
            ErrorCode::RequestAlreadyOpen => "An open request already exists for this order",
            ErrorCode::ReturnPeriodExpired => "Return period has expired",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::StorageFull => "Storage is full",
            ErrorCode::StorageCorrupted => "Storage is corrupted",
            ErrorCode::SystemBusy => "System is busy, please retry",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::InvalidStateTransition),
            4003 => Ok(ErrorCode::CartEmpty),
            4004 => Ok(ErrorCode::CartNotFound),

            // Payment
            5001 => Ok(ErrorCode::PaymentNotFound),
            5002 => Ok(ErrorCode::InvalidRefundState),
            5003 => Ok(ErrorCode::RefundFailed),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductUnavailable),
            6003 => Ok(ErrorCode::InsufficientStock),
            6101 => Ok(ErrorCode::StoreNotFound),

            // Promotion
            7001 => Ok(ErrorCode::PromotionNotFound),
            7002 => Ok(ErrorCode::PromotionExpiredOrInactive),
            7003 => Ok(ErrorCode::PromotionExhausted),
            7004 => Ok(ErrorCode::PromotionNotApplicable),

            // Wallet / Review
            8001 => Ok(ErrorCode::WalletNotFound),
            8101 => Ok(ErrorCode::RequestNotFound),
            8102 => Ok(ErrorCode::RequestAlreadyOpen),
            8103 => Ok(ErrorCode::ReturnPeriodExpired),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9005 => Ok(ErrorCode::ConfigError),
            9401 => Ok(ErrorCode::StorageFull),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
