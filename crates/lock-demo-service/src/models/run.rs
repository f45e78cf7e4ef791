//! 运行请求与结果模型

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockDemoError, Result};
use crate::tracker::{Step, StepTracker};

/// 锁提供方
///
/// 由请求中的 provider 字符串解析而来（不区分大小写），无法识别的值回落到 `NoLock`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Redis 分布式锁
    Redis,
    /// Postgres 锁提供方：资源名交给数据库侧映射为 advisory lock
    PostgresProvider,
    /// Postgres 原生 advisory lock：客户端将 key 哈希为 64 位整数
    PostgresAdvisory,
    /// 不加锁
    NoLock,
}

impl Provider {
    /// 解析 provider 名称
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "redis" => Self::Redis,
            "postgres" => Self::PostgresProvider,
            "dapper" => Self::PostgresAdvisory,
            _ => Self::NoLock,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::PostgresProvider => "postgres",
            Self::PostgresAdvisory => "dapper",
            Self::NoLock => "none",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运行请求
///
/// 所有字段都有默认值，缺省字段按演示场景的默认参数补齐。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunRequest {
    pub actor: String,
    pub use_lock: bool,
    pub provider: String,
    pub key: String,
    pub work_ms: u64,
    pub lock_timeout_ms: u64,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            actor: "Anon".to_string(),
            use_lock: false,
            provider: "redis".to_string(),
            key: "order:demo".to_string(),
            work_ms: 2000,
            lock_timeout_ms: 3000,
        }
    }
}

impl RunRequest {
    /// 校验请求
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(LockDemoError::Validation("key 不能为空".to_string()));
        }
        Ok(())
    }

    pub fn provider_kind(&self) -> Provider {
        Provider::parse(&self.provider)
    }

    pub fn work(&self) -> Duration {
        Duration::from_millis(self.work_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// 单个参与者的运行结果
///
/// `steps` 与 `timestamps_ms` 按下标一一对应。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub actor: String,
    pub use_lock: bool,
    pub provider: String,
    pub key: String,
    pub steps: Vec<String>,
    pub timestamps_ms: Vec<u64>,
}

impl RunResult {
    /// 由请求与步骤记录构建结果，actor 以参数为准
    pub fn from_tracker(actor: &str, request: &RunRequest, tracker: &StepTracker) -> Self {
        Self {
            actor: actor.to_string(),
            use_lock: request.use_lock,
            provider: request.provider.clone(),
            key: request.key.clone(),
            steps: tracker.steps().to_vec(),
            timestamps_ms: tracker.timestamps().to_vec(),
        }
    }

    /// 是否因拿不到锁而被阻断
    pub fn is_blocked(&self) -> bool {
        self.steps.iter().any(|s| s == Step::Blocked.as_str())
    }

    /// 是否完成了全部工作
    pub fn is_done(&self) -> bool {
        self.steps.last().map(String::as_str) == Some(Step::Done.as_str())
    }
}

/// 组合状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// 没有参与者被阻断
    Ok,
    /// 至少一个参与者被阻断
    Conflict,
}

impl RunStatus {
    /// 任一结果包含 Blocked 即为冲突
    pub fn combine<'a>(results: impl IntoIterator<Item = &'a RunResult>) -> Self {
        if results.into_iter().any(RunResult::is_blocked) {
            Self::Conflict
        } else {
            Self::Ok
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Conflict => 409,
        }
    }
}

/// 竞争运行响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResponse {
    pub x: RunResult,
    pub y: RunResult,
    pub status: u16,
}
