//! 结算调度器
//!
//! 启动时补扫，运行期间按 `daily_release_time` 每日触发结算。
//! 批处理本身是同步的 redb 事务，放到 `spawn_blocking` 中执行。

use tokio_util::sync::CancellationToken;

use super::sweep::{SettlementSweeper, SweepOutcome};
use crate::core::error::SettlementResult;
use crate::utils::time;

/// 结算调度器
///
/// 注册为 `TaskKind::Periodic`，在 `start_background_tasks()` 中启动。
pub struct SettlementScheduler {
    sweeper: SettlementSweeper,
    shutdown: CancellationToken,
}

impl SettlementScheduler {
    pub fn new(sweeper: SettlementSweeper, shutdown: CancellationToken) -> Self {
        Self { sweeper, shutdown }
    }

    /// 主循环：启动补扫 → 周期触发
    pub async fn run(self) {
        tracing::info!("Settlement scheduler started");

        // 1. 启动补扫
        let sweeper = self.sweeper.clone();
        Self::log_outcomes("catch-up", Self::blocking(move || sweeper.catch_up()).await);

        // 2. 周期循环
        self.periodic_loop().await;

        tracing::info!("Settlement scheduler stopped");
    }

    async fn periodic_loop(&self) {
        loop {
            let now = self.sweeper.clock().now_millis();
            let sleep_duration = time::duration_until_next_cutoff(
                now,
                self.sweeper.cutoff(),
                self.sweeper.timezone(),
            );
            tracing::info!(
                "Next settlement sweep in {} minutes",
                sleep_duration.as_secs() / 60
            );

            // 等待触发或 shutdown
            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Settlement scheduler received shutdown signal");
                    return;
                }
            }

            let sweeper = self.sweeper.clone();
            Self::log_outcomes("periodic", Self::blocking(move || sweeper.run_due()).await);
        }
    }

    async fn blocking<F>(f: F) -> SettlementResult<Vec<SweepOutcome>>
    where
        F: FnOnce() -> SettlementResult<Vec<SweepOutcome>> + Send + 'static,
    {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Settlement sweep task aborted");
                Ok(Vec::new())
            }
        }
    }

    fn log_outcomes(phase: &str, result: SettlementResult<Vec<SweepOutcome>>) {
        match result {
            Ok(outcomes) => {
                for outcome in outcomes {
                    match outcome {
                        SweepOutcome::Completed { kind, report } => tracing::debug!(
                            phase,
                            kind = ?kind,
                            marker = %report.marker,
                            settled = report.settled,
                            "Sweep finished"
                        ),
                        SweepOutcome::AlreadyDone { marker, .. } => {
                            tracing::debug!(phase, marker = %marker, "Sweep up to date")
                        }
                        SweepOutcome::Locked { marker, .. } => {
                            tracing::info!(phase, marker = %marker, "Sweep left to lease holder")
                        }
                    }
                }
            }
            Err(e) => tracing::error!(phase, error = %e, "Settlement sweep failed"),
        }
    }
}
