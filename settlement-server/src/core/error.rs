use crate::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use shared::models::{OrderStatus, RequestKind};
use thiserror::Error;

/// Settlement engine errors
///
/// Every variant carries enough context to render a user-facing message.
/// Converted to [`AppError`] (stable numeric code) at the API boundary.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Not found ==========
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Store not found: {0}")]
    StoreNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Cart not found: {0}")]
    CartNotFound(String),

    #[error("Promotion not found: {0}")]
    PromotionNotFound(String),

    #[error("Wallet not found for supplier: {0}")]
    WalletNotFound(String),

    #[error("Request not found: {0}")]
    RequestNotFound(String),

    // ========== State machine ==========
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("An open {kind:?} request already exists for order {order_id}")]
    RequestAlreadyOpen { order_id: String, kind: RequestKind },

    #[error("Return period of {window_days} days expired for order {order_id}")]
    ReturnPeriodExpired { order_id: String, window_days: i64 },

    // ========== Inventory / cart ==========
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: u32,
    },

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Cart is empty")]
    EmptyCart,

    // ========== Promotions ==========
    #[error("Promotion {0} is expired or inactive")]
    PromotionExpiredOrInactive(String),

    #[error("Promotion {0} has reached its usage limit")]
    PromotionExhausted(String),

    #[error("Promotion {code} not applicable: {reason}")]
    PromotionNotApplicable { code: String, reason: String },

    // ========== Payments ==========
    #[error("Invalid refund state: {0}")]
    InvalidRefundState(String),

    #[error("Refund failed for order {order_id}: {reason}")]
    RefundFailed { order_id: String, reason: String },

    // ========== Access / input ==========
    #[error("Unauthorized access: {0}")]
    UnauthorizedAccess(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SettlementError {
    pub fn transition(from: OrderStatus, to: OrderStatus) -> Self {
        SettlementError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::RefundFailed { .. } | SettlementError::Storage(_)
        )
    }
}

impl From<redb::TransactionError> for SettlementError {
    fn from(e: redb::TransactionError) -> Self {
        SettlementError::Storage(e.into())
    }
}

impl From<redb::CommitError> for SettlementError {
    fn from(e: redb::CommitError) -> Self {
        SettlementError::Storage(e.into())
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;

/// 将存储错误转换为错误码
fn classify_storage_error(e: &StorageError) -> ErrorCode {
    if let StorageError::Serialization(_) = e {
        return ErrorCode::InternalError;
    }

    // redb 错误通过字符串匹配分类
    let err_str = e.to_string().to_lowercase();

    if err_str.contains("no space") || err_str.contains("disk full") || err_str.contains("enospc")
    {
        return ErrorCode::StorageFull;
    }

    if err_str.contains("corrupt") || err_str.contains("invalid database") {
        return ErrorCode::StorageCorrupted;
    }

    // 默认：系统繁忙
    ErrorCode::SystemBusy
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        let message = err.to_string();
        match err {
            SettlementError::Storage(e) => {
                let code = classify_storage_error(&e);
                tracing::error!(error = %e, error_code = ?code, "Storage error occurred");
                AppError::with_message(code, message)
            }
            SettlementError::Io(e) => {
                tracing::error!(error = %e, "IO error occurred");
                AppError::with_message(ErrorCode::InternalError, message)
            }
            SettlementError::OrderNotFound(id) => {
                AppError::with_message(ErrorCode::OrderNotFound, message).with_detail("order_id", id)
            }
            SettlementError::PaymentNotFound(id) => {
                AppError::with_message(ErrorCode::PaymentNotFound, message).with_detail("payment_id", id)
            }
            SettlementError::StoreNotFound(id) => {
                AppError::with_message(ErrorCode::StoreNotFound, message).with_detail("store_id", id)
            }
            SettlementError::ProductNotFound(id) => {
                AppError::with_message(ErrorCode::ProductNotFound, message).with_detail("product_id", id)
            }
            SettlementError::CartNotFound(id) => {
                AppError::with_message(ErrorCode::CartNotFound, message).with_detail("cart_id", id)
            }
            SettlementError::PromotionNotFound(code) => {
                AppError::with_message(ErrorCode::PromotionNotFound, message).with_detail("code", code)
            }
            SettlementError::WalletNotFound(id) => {
                AppError::with_message(ErrorCode::WalletNotFound, message).with_detail("supplier_id", id)
            }
            SettlementError::RequestNotFound(id) => {
                AppError::with_message(ErrorCode::RequestNotFound, message).with_detail("request_id", id)
            }
            SettlementError::InvalidStateTransition { from, to } => {
                AppError::with_message(ErrorCode::InvalidStateTransition, message)
                    .with_detail("from", from)
                    .with_detail("to", to)
            }
            SettlementError::RequestAlreadyOpen { order_id, kind } => {
                AppError::with_message(ErrorCode::RequestAlreadyOpen, message)
                    .with_detail("order_id", order_id)
                    .with_detail("kind", kind.as_str())
            }
            SettlementError::ReturnPeriodExpired { order_id, window_days } => {
                AppError::with_message(ErrorCode::ReturnPeriodExpired, message)
                    .with_detail("order_id", order_id)
                    .with_detail("window_days", window_days)
            }
            SettlementError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::with_message(ErrorCode::InsufficientStock, message)
                .with_detail("product_id", product_id)
                .with_detail("requested", requested)
                .with_detail("available", available),
            SettlementError::ProductUnavailable(id) => {
                AppError::with_message(ErrorCode::ProductUnavailable, message).with_detail("product_id", id)
            }
            SettlementError::EmptyCart => AppError::with_message(ErrorCode::CartEmpty, message),
            SettlementError::PromotionExpiredOrInactive(code) => {
                AppError::with_message(ErrorCode::PromotionExpiredOrInactive, message)
                    .with_detail("code", code)
            }
            SettlementError::PromotionExhausted(code) => {
                AppError::with_message(ErrorCode::PromotionExhausted, message).with_detail("code", code)
            }
            SettlementError::PromotionNotApplicable { code, .. } => {
                AppError::with_message(ErrorCode::PromotionNotApplicable, message)
                    .with_detail("code", code)
            }
            SettlementError::InvalidRefundState(_) => {
                AppError::with_message(ErrorCode::InvalidRefundState, message)
            }
            SettlementError::RefundFailed { order_id, .. } => {
                AppError::with_message(ErrorCode::RefundFailed, message).with_detail("order_id", order_id)
            }
            SettlementError::UnauthorizedAccess(_) => {
                AppError::with_message(ErrorCode::PermissionDenied, message)
            }
            SettlementError::AlreadyExists(_) => AppError::with_message(ErrorCode::AlreadyExists, message),
            SettlementError::InvalidInput(_) => {
                AppError::with_message(ErrorCode::ValidationFailed, message)
            }
        }
    }
}
