//! 运行演示 API 处理器

use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use crate::{
    error::LockDemoError,
    models::{RaceResponse, RunRequest, RunResult, RunStatus},
    state::AppState,
};

/// 单参与者运行
///
/// POST /api/run
///
/// key 正被占用或超时未取得锁时返回 409。
pub async fn run_single(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResult>, LockDemoError> {
    req.validate()?;

    // 客户端断开时 handler future 被 drop，令牌随之取消
    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let result = state.single.run(&req, &cancel).await?;
    info!(actor = %result.actor, key = %result.key, "Run completed");
    Ok(Json(result))
}

/// 双参与者竞争运行
///
/// POST /api/race
///
/// HTTP 状态码与响应体中的组合状态一致：任一参与者被阻断时为 409。
pub async fn run_race(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<(StatusCode, Json<RaceResponse>), LockDemoError> {
    req.validate()?;

    let cancel = state.request_token();
    let _guard = cancel.clone().drop_guard();

    let outcome = state.race.run(&req, &cancel).await?;
    let status = match outcome.status() {
        RunStatus::Ok => StatusCode::OK,
        RunStatus::Conflict => StatusCode::CONFLICT,
    };

    Ok((status, Json(outcome.into_response())))
}
