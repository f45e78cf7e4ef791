//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;
use std::time::Duration;

use lock_demo_shared::cache::Cache;
use lock_demo_shared::config::AppConfig;
use lock_demo_shared::database::Database;
use tokio_util::sync::CancellationToken;

use crate::lock::{BusyRegistry, LockStrategies};
use crate::service::{
    NightlyReportJob, RaceConfig, RaceCoordinator, SingleRunner, TokioSleeper, WorkSimulator,
};

/// Axum 应用共享状态
///
/// 所有字段都可以廉价克隆，handler 之间共享同一组策略和进程内占用表。
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cache: Cache,
    pub strategies: Arc<LockStrategies>,
    /// 进程内单飞守卫，进程启动时创建
    pub busy: BusyRegistry,
    pub race: RaceCoordinator,
    pub single: SingleRunner,
    pub report: NightlyReportJob,
    /// 服务关闭时取消，每个请求派生自己的子令牌
    pub shutdown: CancellationToken,
}

impl AppState {
    /// 创建包含全部锁后端的应用状态
    pub fn new(config: &AppConfig, db: Database, cache: Cache, shutdown: CancellationToken) -> Self {
        let strategies = LockStrategies::with_backends(cache.clone(), db.pool().clone(), &config.lock);
        Self::with_strategies(config, db, cache, strategies, shutdown)
    }

    /// 使用给定的锁策略注册表创建应用状态
    pub fn with_strategies(
        config: &AppConfig,
        db: Database,
        cache: Cache,
        strategies: LockStrategies,
        shutdown: CancellationToken,
    ) -> Self {
        let strategies = Arc::new(strategies);
        let busy = BusyRegistry::new();
        let simulator = WorkSimulator::new(Arc::new(TokioSleeper));

        let race = RaceCoordinator::new(
            strategies.clone(),
            simulator.clone(),
            RaceConfig::from(&config.demo),
        );
        let single = SingleRunner::new(
            strategies.clone(),
            busy.clone(),
            simulator.clone(),
            Duration::from_millis(config.demo.pre_phase_ms),
        );
        let report = NightlyReportJob::new(
            db.pool().clone(),
            strategies.clone(),
            simulator.sleeper().clone(),
            &config.demo,
        );

        Self {
            db,
            cache,
            strategies,
            busy,
            race,
            single,
            report,
            shutdown,
        }
    }

    /// 为单个请求派生取消令牌
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
