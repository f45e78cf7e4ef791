//! 夜间报表演示 API 处理器
//!
//! 三个端点分别演示直接 SQL、Postgres 锁提供方和 Redis 锁提供方，
//! 已有实例在运行时返回 409。

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::{error::LockDemoError, models::Provider, service::ReportOutcome, state::AppState};

fn respond(outcome: ReportOutcome) -> (StatusCode, Json<Value>) {
    let status = match outcome {
        ReportOutcome::Completed => StatusCode::OK,
        ReportOutcome::AlreadyRunning => StatusCode::CONFLICT,
    };
    (status, Json(json!({ "message": outcome.message() })))
}

/// POST /locking-demo
pub async fn run_raw(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), LockDemoError> {
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let outcome = state.report.run_raw(&cancel).await?;
    Ok(respond(outcome))
}

/// POST /locking-demo/postgres
pub async fn run_postgres(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), LockDemoError> {
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let outcome = state
        .report
        .run_with(Provider::PostgresProvider, &cancel)
        .await?;
    Ok(respond(outcome))
}

/// POST /locking-demo/redis
pub async fn run_redis(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), LockDemoError> {
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let outcome = state.report.run_with(Provider::Redis, &cancel).await?;
    Ok(respond(outcome))
}
