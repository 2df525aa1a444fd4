//! 核心模块 - 配置、状态、错误和后台任务
//!
//! # 模块结构
//!
//! - [`Config`] - 服务配置
//! - [`SettlementState`] - 引擎状态 (所有组件)
//! - [`SettlementError`] - 领域错误
//! - [`BackgroundTasks`] - 后台任务管理

pub mod config;
pub mod error;
pub mod state;
pub mod tasks;

pub use config::{Config, EngineSettings};
pub use error::{SettlementError, SettlementResult};
pub use state::SettlementState;
pub use tasks::{BackgroundTasks, TaskKind};
