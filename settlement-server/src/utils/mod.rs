//! 工具模块 - 日志与时间
//!
//! - [`logger`] - tracing 日志初始化
//! - [`time`] - 业务时区换算与 [`Clock`]

pub mod logger;
pub mod time;

pub use time::{Clock, ManualClock, SystemClock};
