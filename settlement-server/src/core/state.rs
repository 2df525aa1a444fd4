use std::sync::Arc;
use std::time::Duration;

use crate::cart::CartService;
use crate::core::config::Config;
use crate::core::error::SettlementResult;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::inventory::InventoryLedger;
use crate::orders::OrdersManager;
use crate::promotions::PromotionEngine;
use crate::returns::ReviewService;
use crate::services::Collaborators;
use crate::storage::SettlementStorage;
use crate::utils::{Clock, SystemClock};
use crate::wallet::{RedbSweepLock, SettlementScheduler, SettlementSweeper, SweepLock, WalletLedger};

/// 引擎状态 - 持有所有组件的共享引用
///
/// 所有组件共享同一个 [`SettlementStorage`]，克隆开销很小。
///
/// # 使用示例
///
/// ```ignore
/// let state = SettlementState::initialize(&config)?;
/// let outcome = state.orders.checkout(&actor, request)?;
/// let mut tasks = state.start_background_tasks();
/// ```
#[derive(Clone)]
pub struct SettlementState {
    pub config: Config,
    pub storage: SettlementStorage,
    pub clock: Arc<dyn Clock>,
    pub collaborators: Collaborators,
    pub inventory: InventoryLedger,
    pub carts: CartService,
    pub promotions: PromotionEngine,
    pub wallets: WalletLedger,
    pub orders: OrdersManager,
    pub reviews: ReviewService,
    pub sweep_lock: Arc<dyn SweepLock>,
}

impl std::fmt::Debug for SettlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementState")
            .field("config", &self.config)
            .field("collaborators", &self.collaborators)
            .finish_non_exhaustive()
    }
}

impl SettlementState {
    /// 初始化引擎状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录
    /// 2. 数据库 (work_dir/database_file)
    /// 3. 各组件 (本地协作方、系统时钟)
    pub fn initialize(config: &Config) -> SettlementResult<Self> {
        std::fs::create_dir_all(&config.work_dir)?;
        let storage = SettlementStorage::open(config.database_path())?;
        tracing::info!(path = %config.database_path().display(), "Settlement database opened");

        Ok(Self::with_storage(
            config.clone(),
            storage,
            Arc::new(SystemClock),
            Collaborators::local(config.fault_suspension_threshold),
        ))
    }

    /// 手动组装 (测试或自定义协作方)
    pub fn with_storage(
        config: Config,
        storage: SettlementStorage,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Self {
        let settings = config.engine.clone();
        let inventory = InventoryLedger::new(storage.clone(), clock.clone());
        let carts = CartService::new(storage.clone(), clock.clone());
        let promotions = PromotionEngine::new(storage.clone(), clock.clone());
        let wallets = WalletLedger::new(
            storage.clone(),
            clock.clone(),
            settings.commission_rate,
            settings.timezone,
        );
        let orders = OrdersManager::new(
            storage.clone(),
            settings.clone(),
            clock.clone(),
            collaborators.clone(),
            inventory.clone(),
            promotions.clone(),
            wallets.clone(),
        );
        let reviews = ReviewService::new(
            storage.clone(),
            orders.clone(),
            clock.clone(),
            collaborators.notifier.clone(),
            settings.return_window_days,
        );
        let sweep_lock: Arc<dyn SweepLock> = Arc::new(RedbSweepLock::new(storage.clone(), clock.clone()));

        Self {
            config,
            storage,
            clock,
            collaborators,
            inventory,
            carts,
            promotions,
            wallets,
            orders,
            reviews,
            sweep_lock,
        }
    }

    /// 结算批处理器 (调度器和手动触发共用)
    pub fn sweeper(&self) -> SettlementSweeper {
        let settings = &self.config.engine;
        SettlementSweeper::new(
            self.storage.clone(),
            self.wallets.clone(),
            self.promotions.clone(),
            self.sweep_lock.clone(),
            self.clock.clone(),
            settings.instance_id.clone(),
            Duration::from_secs(settings.sweep_lease_ttl_secs),
            settings.timezone,
            settings.daily_release_time,
        )
    }

    /// 启动后台任务
    ///
    /// - Warmup: 钱包账本对账
    /// - Periodic: 结算调度器
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let wallets = self.wallets.clone();
        tasks.spawn("ledger_reconcile", TaskKind::Warmup, async move {
            match tokio::task::spawn_blocking(move || wallets.reconcile_all()).await {
                Ok(Ok(broken)) if broken.is_empty() => {
                    tracing::info!("Wallet ledgers reconciled");
                }
                Ok(Ok(broken)) => {
                    tracing::error!(wallets = broken.len(), "Wallet ledger mismatches found at startup");
                }
                Ok(Err(e)) => tracing::error!(error = %e, "Wallet reconciliation failed"),
                Err(e) => tracing::error!(error = %e, "Wallet reconciliation task aborted"),
            }
        });

        let scheduler = SettlementScheduler::new(self.sweeper(), tasks.shutdown_token());
        tasks.spawn("settlement_scheduler", TaskKind::Periodic, scheduler.run());

        tracing::info!(tasks = tasks.len(), "Background tasks started");
        tasks
    }
}
