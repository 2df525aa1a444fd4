use rust_decimal::{Decimal, RoundingStrategy};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a random v4 UUID string for use as resource ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Round a monetary amount to 2 decimal places (half away from zero)
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
