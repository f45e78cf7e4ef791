//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use lock_demo_shared::observability::middleware as obs_middleware;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::{handlers, state::AppState};

/// 运行演示路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/run", post(handlers::run::run_single))
        .route("/race", post(handlers::run::run_race))
}

/// 夜间报表演示路由
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/locking-demo", post(handlers::report::run_raw))
        .route("/locking-demo/postgres", post(handlers::report::run_postgres))
        .route("/locking-demo/redis", post(handlers::report::run_redis))
}

/// 构建完整的应用路由
///
/// 包含业务路由、健康检查以及请求追踪中间件。
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .merge(report_routes())
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

/// 根据逗号分隔的来源列表构建 CORS 层，`*` 表示任意来源
pub fn cors_layer(allowed_origins: &str, production: bool) -> CorsLayer {
    if allowed_origins.trim() == "*" {
        if production {
            warn!("cors_origins=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    info!("CORS allowed_origins: {}", allowed_origins);
    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
