//! 授权能力
//!
//! Every engine operation receives an [`Actor`]: the caller's identity and
//! role, resolved upstream by whatever authenticates the request. Ownership
//! checks are done here against the entity being touched.

use crate::core::error::{SettlementError, SettlementResult};
use shared::models::{Order, Store};

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Supplier,
    Admin,
    /// Scheduler, payment callbacks and other internal triggers
    System,
}

/// 当前调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn customer(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Customer)
    }

    pub fn supplier(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Supplier)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn system() -> Self {
        Self::new("system", Role::System)
    }

    /// Admin and system callers bypass ownership checks
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin | Role::System)
    }

    pub fn require_privileged(&self) -> SettlementResult<()> {
        if self.is_privileged() {
            return Ok(());
        }
        Err(self.denied("administrator role required"))
    }

    /// The caller is the customer who owns the resource
    pub fn require_customer(&self, customer_id: &str) -> SettlementResult<()> {
        if self.role == Role::Customer && self.user_id == customer_id {
            return Ok(());
        }
        Err(self.denied("resource belongs to another customer"))
    }

    /// The caller owns the store, or is privileged
    pub fn require_store_owner(&self, store: &Store) -> SettlementResult<()> {
        self.require_supplier_or_privileged(&store.supplier_id)
    }

    /// The caller is the supplier fulfilling the order, or is privileged
    pub fn require_order_supplier(&self, order: &Order) -> SettlementResult<()> {
        self.require_supplier_or_privileged(&order.supplier_id)
    }

    /// The caller is the order's customer, its supplier, or privileged
    pub fn require_order_party(&self, order: &Order) -> SettlementResult<()> {
        if self.is_privileged()
            || (self.role == Role::Customer && self.user_id == order.customer_id)
            || (self.role == Role::Supplier && self.user_id == order.supplier_id)
        {
            return Ok(());
        }
        Err(self.denied("not a party to this order"))
    }

    fn require_supplier_or_privileged(&self, supplier_id: &str) -> SettlementResult<()> {
        if self.is_privileged() || (self.role == Role::Supplier && self.user_id == supplier_id) {
            return Ok(());
        }
        Err(self.denied("resource belongs to another supplier"))
    }

    fn denied(&self, reason: &str) -> SettlementError {
        tracing::warn!(user_id = %self.user_id, role = ?self.role, reason, "Access denied");
        SettlementError::UnauthorizedAccess(format!("{} ({:?} {})", reason, self.role, self.user_id))
    }
}
