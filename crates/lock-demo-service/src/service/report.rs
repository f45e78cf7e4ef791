//! 夜间报表任务
//!
//! 同一时间只允许一个实例执行报表任务。任务开始前尝试获取固定资源名上的锁，
//! 拿不到立即返回"已在运行"；拿到后模拟执行一段时间，无论成功与否都释放锁。
//!
//! 提供两条路径：
//!
//! - 直接 SQL：在池连接上调用 `pg_try_advisory_lock` / `pg_advisory_unlock`
//! - 锁策略：通过注册表选择 Postgres 或 Redis 策略，零等待加锁

use std::sync::Arc;
use std::time::Duration;

use lock_demo_shared::config::DemoSettings;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::error::Result;
use crate::lock::{AdvisoryKey, LockHandle, LockStrategies, acquire_session_lock, advisory_key};
use crate::models::Provider;
use crate::service::simulator::Sleeper;

/// 报表任务结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Completed,
    AlreadyRunning,
}

impl ReportOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Completed => "Nightly report completed successfully.",
            Self::AlreadyRunning => "Another process is already running the nightly report.",
        }
    }
}

/// 夜间报表任务
#[derive(Clone)]
pub struct NightlyReportJob {
    pool: PgPool,
    strategies: Arc<LockStrategies>,
    sleeper: Arc<dyn Sleeper>,
    resource: String,
    hold: Duration,
}

impl NightlyReportJob {
    pub fn new(
        pool: PgPool,
        strategies: Arc<LockStrategies>,
        sleeper: Arc<dyn Sleeper>,
        settings: &DemoSettings,
    ) -> Self {
        Self {
            pool,
            strategies,
            sleeper,
            resource: settings.report_resource.clone(),
            hold: Duration::from_millis(settings.report_hold_ms),
        }
    }

    /// 直接 SQL 路径
    #[instrument(skip(self, cancel), fields(resource = %self.resource))]
    pub async fn run_raw(&self, cancel: &CancellationToken) -> Result<ReportOutcome> {
        let acquired = acquire_session_lock(
            &self.pool,
            &self.resource,
            AdvisoryKey::Id(advisory_key(&self.resource)),
            Duration::ZERO,
            Duration::ZERO,
            cancel,
            "dapper",
        )
        .await?;

        match acquired {
            Some(handle) => self.hold(handle, cancel).await,
            None => {
                info!("Nightly report already running");
                Ok(ReportOutcome::AlreadyRunning)
            }
        }
    }

    /// 锁策略路径
    #[instrument(skip(self, cancel), fields(resource = %self.resource))]
    pub async fn run_with(&self, provider: Provider, cancel: &CancellationToken) -> Result<ReportOutcome> {
        let acquired = self
            .strategies
            .select(provider)
            .try_acquire(&self.resource, Duration::ZERO, cancel)
            .await?;

        match acquired {
            Some(handle) => self.hold(handle, cancel).await,
            None => {
                info!("Nightly report already running");
                Ok(ReportOutcome::AlreadyRunning)
            }
        }
    }

    async fn hold(&self, mut handle: LockHandle, cancel: &CancellationToken) -> Result<ReportOutcome> {
        let worked = self.sleeper.sleep(self.hold, cancel).await;
        let released = handle.release().await;
        worked.and(released)?;

        info!(held_ms = self.hold.as_millis() as u64, "Nightly report completed");
        Ok(ReportOutcome::Completed)
    }
}
