//! Order state machine
//!
//! - [`manager`] - checkout, transitions and their side effects
//! - [`money`] - decimal helpers shared with the wallet

pub mod manager;
pub mod money;

pub use manager::{CheckoutOutcome, CheckoutRequest, OrdersManager};
