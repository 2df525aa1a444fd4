//! Shared types for the marketplace settlement engine
//!
//! Domain models, unified error codes and small utility helpers used by
//! `settlement-server` and by any API layer built on top of it.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCode};
pub use serde::{Deserialize, Serialize};
