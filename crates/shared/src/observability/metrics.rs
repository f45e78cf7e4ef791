//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "lock_acquire_total",
        "Lock acquisition attempts by backend and outcome"
    );
    metrics::describe_histogram!(
        "lock_acquire_wait_seconds",
        "Time spent waiting for a lock in seconds"
    );
    metrics::describe_counter!("lock_release_total", "Lock releases by backend and outcome");

    metrics::describe_counter!("race_runs_total", "Total number of two-actor race runs");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次加锁尝试
///
/// `outcome` 取值：acquired / contended / error / cancelled
#[inline]
pub fn record_lock_acquire(backend: &'static str, outcome: &'static str, wait_secs: f64) {
    metrics::counter!(
        "lock_acquire_total",
        "backend" => backend,
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!("lock_acquire_wait_seconds", "backend" => backend).record(wait_secs);
}

/// 记录一次锁释放
#[inline]
pub fn record_lock_release(backend: &'static str, outcome: &'static str) {
    metrics::counter!(
        "lock_release_total",
        "backend" => backend,
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录一次双参与者竞争运行
#[inline]
pub fn record_race_run(status: u16) {
    metrics::counter!("race_runs_total", "status" => status.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("POST", "/api/run", 200, 0.1);
        record_lock_acquire("redis", "acquired", 0.02);
        record_lock_acquire("postgres", "contended", 3.0);
        record_lock_release("redis", "ok");
        record_race_run(409);
    }
}
