//! Data models
//!
//! Persisted as JSON values in the settlement store and shared with any
//! API layer. IDs are `String` (UUID v4), timestamps are Unix millis,
//! money is `rust_decimal::Decimal` with 2 decimal places.

pub mod catalog;
pub mod order;
pub mod promotion;
pub mod review;
pub mod wallet;

// Re-exports
pub use catalog::*;
pub use order::*;
pub use promotion::*;
pub use review::*;
pub use wallet::*;
