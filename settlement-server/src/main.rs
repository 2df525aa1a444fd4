use settlement_server::{SettlementState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志) 并加载配置
    let config = setup_environment();

    print_banner();
    tracing::info!(
        environment = %config.environment,
        work_dir = %config.work_dir,
        "Settlement server starting..."
    );

    // 2. 初始化引擎状态
    let state = SettlementState::initialize(&config)?;

    // 3. 启动后台任务 (对账 + 结算调度)
    let tasks = state.start_background_tasks();

    // 4. 等待退出信号
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    tasks.shutdown().await;

    tracing::info!("Settlement server stopped");
    Ok(())
}
