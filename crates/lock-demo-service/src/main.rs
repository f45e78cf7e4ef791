//! 分布式互斥演示服务

use lock_demo::{routes, state::AppState};
use lock_demo_shared::{
    cache::Cache,
    config::AppConfig,
    database::Database,
    observability,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("lock-demo-service")?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting lock-demo-service on {}", config.server_addr());

    // 连接池惰性建立，后端暂不可用时服务仍可启动
    let db = Database::connect_lazy(&config.database)?;
    let cache = Cache::new(&config.redis)?;
    warm_up(&db, &cache).await;

    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, db.clone(), cache, shutdown.clone());

    let app = routes::app(state).layer(routes::cors_layer(
        &config.cors_origins,
        config.is_production(),
    ));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 启动预热：提前建立数据库和 Redis 连接，失败只记录警告
async fn warm_up(db: &Database, cache: &Cache) {
    match db.health_check().await {
        Ok(()) => info!("Database warm-up succeeded"),
        Err(e) => warn!(error = %e, "Database warm-up failed"),
    }
    match cache.health_check().await {
        Ok(()) => info!("Redis warm-up succeeded"),
        Err(e) => warn!(error = %e, "Redis warm-up failed"),
    }
}

/// 监听关闭信号
///
/// 收到 SIGTERM 或 Ctrl+C 后取消根令牌，进行中的运行随之取消并释放已持有的锁。
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }

    shutdown.cancel();
}
