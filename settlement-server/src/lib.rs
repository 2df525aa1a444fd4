//! Settlement Server - 多商户交易结算引擎
//!
//! # 架构概述
//!
//! 订单从购物车结账开始，经过供应商履约、签收入账、取消/退货冲正，
//! 最终由每日/每月批处理把供应商钱包余额结清。所有状态变更都在
//! redb 写事务内完成，事务提交后才会触发通知、退款和信誉记录。
//!
//! - **订单** (`orders`): 结账和订单状态机
//! - **钱包** (`wallet`): 供应商钱包账本、结算批处理、调度器
//! - **库存** (`inventory`): 店铺商品库存
//! - **促销** (`promotions`): 折扣码核销与回滚
//! - **审核** (`returns`): 取消/退货申请审批
//!
//! # 模块结构
//!
//! ```text
//! settlement-server/src/
//! ├── core/          # 配置、状态、错误、后台任务
//! ├── auth/          # 调用方身份与授权检查
//! ├── storage.rs     # redb 存储层
//! ├── cart/          # 每店购物车
//! ├── inventory/     # 库存账本
//! ├── promotions/    # 促销引擎
//! ├── orders/        # 结账、状态机、金额计算
//! ├── returns/       # 取消/退货审核
//! ├── wallet/        # 钱包账本、批处理、租约、调度器
//! ├── services/      # 外部协作方 (通知、支付网关、信誉)
//! └── utils/         # 日志、时间
//! ```

pub mod auth;
pub mod cart;
pub mod core;
pub mod inventory;
pub mod orders;
pub mod promotions;
pub mod returns;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export 公共类型
pub use auth::{Actor, Role};
pub use core::{BackgroundTasks, Config, EngineSettings, SettlementError, SettlementResult, SettlementState};
pub use orders::{CheckoutOutcome, CheckoutRequest, OrdersManager};
pub use storage::SettlementStorage;
pub use wallet::{SettlementSweeper, SweepOutcome, WalletLedger};

// Re-export unified error types from shared
pub use shared::error::{AppError, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 加载 `.env` 并按配置初始化日志
///
/// 返回最终生效的配置 (环境变量优先)。
pub fn setup_environment() -> Config {
    if let Err(e) = dotenv::dotenv() {
        // .env 可选
        eprintln!("No .env loaded: {e}");
    }
    let config = Config::from_env();
    init_logger_with_file(
        Some(&config.log_level),
        config.log_json,
        config.log_dir.as_deref(),
    );
    config
}

pub fn print_banner() {
    println!(
        r#"
   _____      __  __  __                          __
  / ___/___  / /_/ /_/ /__  ____ ___  ___  ____  / /_
  \__ \/ _ \/ __/ __/ / _ \/ __ `__ \/ _ \/ __ \/ __/
 ___/ /  __/ /_/ /_/ /  __/ / / / / /  __/ / / / /_
/____/\___/\__/\__/_/\___/_/ /_/ /_/\___/_/ /_/\__/
    "#
    );
}
