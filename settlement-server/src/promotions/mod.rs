//! Promotion Redemption Engine
//!
//! Redemption is one operation inside the caller's write transaction:
//!
//! ```text
//! redeem_txn(code, customer, order, amount)
//!     ├─ 1. Load promotion (the write txn is the exclusive lock)
//!     ├─ 2. Re-validate status, window, minimum amount
//!     ├─ 3. Per-customer cap: count redemption rows
//!     ├─ 4. Conditional increment: usage_count < usage_limit
//!     ├─ 5. Insert redemption row
//!     └─ 6. Return discount
//! ```
//!
//! Steps 3 and 4 run under the same writer, so two redemptions can never both
//! observe the last free slot.

use std::sync::Arc;

use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::models::{DiscountType, Promotion, PromotionRedemption, PromotionStatus};
use shared::util::{new_id, round_money};

use crate::auth::Actor;
use crate::core::error::{SettlementError, SettlementResult};
use crate::storage::SettlementStorage;
use crate::utils::Clock;

const HUNDRED: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Promotion create input
#[derive(Debug, Clone)]
pub struct PromotionInput {
    pub code: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub start_date: i64,
    pub end_date: i64,
    pub usage_limit: Option<u32>,
    pub per_customer_limit: Option<u32>,
}

/// Discount for `amount`, never negative and never above `amount`
///
/// Percentage: `amount × value / 100`, capped at `max_discount_amount`.
/// Fixed: `value`, capped at `amount`.
pub fn compute_discount(promotion: &Promotion, amount: Decimal) -> Decimal {
    if amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let raw = match promotion.discount_type {
        DiscountType::Percentage => {
            let pct = round_money(amount * promotion.discount_value / HUNDRED);
            match promotion.max_discount_amount {
                Some(cap) => pct.min(cap),
                None => pct,
            }
        }
        DiscountType::FixedAmount => promotion.discount_value,
    };
    raw.max(Decimal::ZERO).min(amount)
}

#[derive(Clone)]
pub struct PromotionEngine {
    storage: SettlementStorage,
    clock: Arc<dyn Clock>,
}

impl PromotionEngine {
    pub fn new(storage: SettlementStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    // ========== Admin ==========

    pub fn create_promotion(&self, actor: &Actor, input: PromotionInput) -> SettlementResult<Promotion> {
        actor.require_privileged()?;
        validate_input(&input)?;

        let now = self.clock.now_millis();
        let txn = self.storage.begin_write()?;
        if self.storage.get_promotion_txn(&txn, &input.code)?.is_some() {
            return Err(SettlementError::AlreadyExists(format!("promotion {}", input.code)));
        }
        let promotion = Promotion {
            id: new_id(),
            code: input.code,
            name: input.name,
            discount_type: input.discount_type,
            discount_value: input.discount_value,
            min_order_amount: input.min_order_amount,
            max_discount_amount: input.max_discount_amount,
            start_date: input.start_date,
            end_date: input.end_date,
            usage_limit: input.usage_limit,
            per_customer_limit: input.per_customer_limit,
            usage_count: 0,
            status: PromotionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.storage.store_promotion(&txn, &promotion)?;
        txn.commit()?;

        tracing::info!(code = %promotion.code, "Promotion created");
        Ok(promotion)
    }

    /// Activate or deactivate a promotion
    pub fn set_status(
        &self,
        actor: &Actor,
        code: &str,
        status: PromotionStatus,
    ) -> SettlementResult<Promotion> {
        actor.require_privileged()?;
        let txn = self.storage.begin_write()?;
        let mut promotion = self
            .storage
            .get_promotion_txn(&txn, code)?
            .ok_or_else(|| SettlementError::PromotionNotFound(code.to_string()))?;
        if promotion.status == PromotionStatus::Expired && status == PromotionStatus::Active {
            return Err(SettlementError::InvalidStateTransition {
                from: "EXPIRED".to_string(),
                to: "ACTIVE".to_string(),
            });
        }
        promotion.status = status;
        promotion.updated_at = self.clock.now_millis();
        self.storage.store_promotion(&txn, &promotion)?;
        txn.commit()?;

        tracing::info!(code = %code, status = ?status, "Promotion status changed");
        Ok(promotion)
    }

    pub fn get_promotion(&self, code: &str) -> SettlementResult<Promotion> {
        self.storage
            .get_promotion(code)?
            .ok_or_else(|| SettlementError::PromotionNotFound(code.to_string()))
    }

    pub fn redemptions(&self, code: &str) -> SettlementResult<Vec<PromotionRedemption>> {
        Ok(self.storage.list_redemptions(code)?)
    }

    /// Mark every active promotion whose window has ended as expired
    pub fn expire_past_window(&self) -> SettlementResult<usize> {
        let now = self.clock.now_millis();
        let due: Vec<String> = self
            .storage
            .list_promotions()?
            .into_iter()
            .filter(|p| p.status != PromotionStatus::Expired && p.end_date < now)
            .map(|p| p.code)
            .collect();
        if due.is_empty() {
            return Ok(0);
        }

        let txn = self.storage.begin_write()?;
        let mut expired = 0;
        for code in &due {
            if let Some(mut promotion) = self.storage.get_promotion_txn(&txn, code)? {
                promotion.status = PromotionStatus::Expired;
                promotion.updated_at = now;
                self.storage.store_promotion(&txn, &promotion)?;
                expired += 1;
            }
        }
        txn.commit()?;

        tracing::info!(expired, "Promotions expired");
        Ok(expired)
    }

    // ========== Redemption ==========

    /// Validate and redeem a code for one order inside the caller's transaction
    pub fn redeem_txn(
        &self,
        txn: &WriteTransaction,
        code: &str,
        customer_id: &str,
        order_id: &str,
        amount: Decimal,
        now: i64,
    ) -> SettlementResult<PromotionRedemption> {
        let mut promotion = self
            .storage
            .get_promotion_txn(txn, code)?
            .ok_or_else(|| SettlementError::PromotionNotFound(code.to_string()))?;

        if promotion.status != PromotionStatus::Active || !promotion.is_within_window(now) {
            return Err(SettlementError::PromotionExpiredOrInactive(code.to_string()));
        }
        if let Some(min) = promotion.min_order_amount
            && amount < min
        {
            return Err(SettlementError::PromotionNotApplicable {
                code: code.to_string(),
                reason: format!("order amount {amount} below minimum {min}"),
            });
        }

        if let Some(per_customer) = promotion.per_customer_limit {
            let used = self
                .storage
                .count_customer_redemptions_txn(txn, code, customer_id)?;
            if used >= per_customer {
                tracing::debug!(code = %code, customer_id = %customer_id, used, "Per-customer limit reached");
                return Err(SettlementError::PromotionExhausted(code.to_string()));
            }
        }

        // Conditional increment: no free slot means another redemption won it
        if promotion.remaining_uses() == Some(0) {
            return Err(SettlementError::PromotionExhausted(code.to_string()));
        }
        promotion.usage_count += 1;
        promotion.updated_at = now;
        self.storage.store_promotion(txn, &promotion)?;

        let redemption = PromotionRedemption {
            id: new_id(),
            promotion_code: code.to_string(),
            customer_id: customer_id.to_string(),
            order_id: order_id.to_string(),
            order_amount: amount,
            discount_amount: compute_discount(&promotion, amount),
            redeemed_at: now,
        };
        self.storage.insert_redemption(txn, &redemption)?;

        tracing::debug!(
            code = %code,
            order_id = %order_id,
            discount = %redemption.discount_amount,
            usage_count = promotion.usage_count,
            "Promotion redeemed"
        );
        Ok(redemption)
    }

    /// Undo a redemption: delete the row and decrement the counter together
    ///
    /// Returns false when there was nothing to roll back.
    pub fn rollback_txn(
        &self,
        txn: &WriteTransaction,
        code: &str,
        customer_id: &str,
        order_id: &str,
        now: i64,
    ) -> SettlementResult<bool> {
        let removed = self
            .storage
            .remove_redemption(txn, code, customer_id, order_id)?;
        if removed.is_none() {
            return Ok(false);
        }
        if let Some(mut promotion) = self.storage.get_promotion_txn(txn, code)? {
            promotion.usage_count = promotion.usage_count.saturating_sub(1);
            promotion.updated_at = now;
            self.storage.store_promotion(txn, &promotion)?;
        }
        tracing::debug!(code = %code, order_id = %order_id, "Promotion redemption rolled back");
        Ok(true)
    }
}

fn validate_input(input: &PromotionInput) -> SettlementResult<()> {
    let invalid = |msg: String| Err(SettlementError::InvalidInput(msg));
    if input.code.trim().is_empty() || input.code.trim() != input.code {
        return invalid(format!("invalid promotion code '{}'", input.code));
    }
    if input.start_date > input.end_date {
        return invalid("start date after end date".to_string());
    }
    match input.discount_type {
        DiscountType::Percentage => {
            if input.discount_value <= Decimal::ZERO || input.discount_value > HUNDRED {
                return invalid(format!(
                    "percentage must be in (0, 100], got {}",
                    input.discount_value
                ));
            }
        }
        DiscountType::FixedAmount => {
            if input.discount_value <= Decimal::ZERO {
                return invalid(format!(
                    "fixed discount must be positive, got {}",
                    input.discount_value
                ));
            }
        }
    }
    if input.max_discount_amount.is_some_and(|m| m <= Decimal::ZERO) {
        return invalid("max discount must be positive".to_string());
    }
    if input.usage_limit == Some(0) || input.per_customer_limit == Some(0) {
        return invalid("usage limits must be positive when set".to_string());
    }
    Ok(())
}
