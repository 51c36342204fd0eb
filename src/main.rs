use std::sync::Arc;

use orbit_backend::api::create_api_router;
use orbit_backend::state::AppState;
use orbit_backend::timing::{TimingState, timing_middleware};
use orbit_backend::{AppConfig, ServerRunner, ShutdownManager, StartupError, StoreClient};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // 订阅器可能尚未初始化（配置加载失败时），统一走 stderr
        eprintln!("启动失败: {e}");
        std::process::exit(1);
    }
}

/// 应用组合根：任何启动失败都向上传播并中止进程
async fn run() -> Result<(), StartupError> {
    // 配置先于日志初始化，日志级别取自配置（RUST_LOG 可覆盖）
    AppConfig::init_global()?;
    let config = AppConfig::global();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("orbit_backend={},tower_http=info", config.logging.level).into()
            }),
        )
        .init();

    tracing::info!("Starting orbit-backend");

    // 创建优雅退出管理器并注册信号处理器
    let shutdown_manager = ShutdownManager::new();
    shutdown_manager.start_signal_handler().await?;

    // 连接文档存储
    let store = Arc::new(StoreClient::connect(&config.store).await?);

    // 绑定监听地址（失败即中止，不留下半初始化状态）
    let runner = ServerRunner::bind(&config.server)?;

    // Routes
    let app_state = AppState {
        shutdown: shutdown_manager.clone(),
        store: store.clone(),
    };
    let timing_state = TimingState {
        request_timeout: config.timing.request_timeout_duration(),
    };
    let app = create_api_router()
        .with_state(app_state)
        .layer(axum::middleware::from_fn_with_state(
            timing_state,
            timing_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    let handle = runner.start(app, &shutdown_manager);

    tracing::info!("Server: http://{}", handle.addr());
    tracing::info!("Health: http://{}/health-check", handle.addr());
    tracing::info!(
        "请求超时阈值: {}秒, keep-alive: {}秒",
        config.timing.request_timeout_secs,
        config.server.keep_alive_secs
    );

    // 主任务挂起等待退出信号；触发源只翻转状态，清理统一在这里执行
    let trigger = shutdown_manager.wait_for_shutdown().await;
    tracing::info!("接收到退出信号: {:?}，开始优雅退出...", trigger);

    // 优雅关停受配置期限约束，超时会强制关闭剩余连接
    tracing::info!("优雅退出超时时间: {}秒", config.shutdown.timeout_secs);
    if let Err(e) = handle.stop(config.shutdown.timeout_duration()).await {
        tracing::warn!("服务器关停未按预期完成: {}", e);
    }

    // 监听器与存储连接都已释放后才允许进程退出
    store.close().await;

    tracing::info!("优雅退出完成 (exit code: {})", trigger.exit_code());
    std::process::exit(trigger.exit_code());
}
