//! 锁策略抽象与注册表
//!
//! 所有后端统一实现 `LockStrategy`，调用方只依赖"在超时内尝试加锁，返回句柄或 None"这一契约。
//! 注册表按 `Provider` 路由到具体策略，未注册的 provider 回落到不加锁策略。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lock_demo_shared::observability::metrics;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::lock::handle::LockHandle;
use crate::lock::noop::NoLockStrategy;
use crate::models::Provider;

/// 锁策略
///
/// - 成功：返回 `Some(LockHandle)`，调用方负责释放
/// - 超时或竞争：返回 `None`，不是错误
/// - 后端故障：返回 `Err`，不会被转换为 `None`
/// - 取消：返回 `Err(LockDemoError::Cancelled)`，不会遗留已获取的资源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockStrategy: Send + Sync {
    /// 后端名称，用于日志和指标
    fn backend(&self) -> &'static str;

    /// 在 `timeout` 内尝试加锁，由各后端实现
    async fn acquire_within(
        &self,
        key: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>>;

    /// 尝试加锁并记录等待耗时与结果
    async fn try_acquire(
        &self,
        key: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>> {
        let backend = self.backend();
        let started = Instant::now();
        let result = self.acquire_within(key, timeout, cancel).await;
        let waited = started.elapsed();

        let outcome = match &result {
            Ok(Some(_)) => "acquired",
            Ok(None) => "contended",
            Err(e) if e.is_cancelled() => "cancelled",
            Err(_) => "error",
        };
        metrics::record_lock_acquire(backend, outcome, waited.as_secs_f64());

        match &result {
            Err(e) if !e.is_cancelled() => {
                warn!(key = %key, backend, error = %e, "Lock acquisition failed");
            }
            _ => {
                debug!(
                    key = %key,
                    backend,
                    outcome,
                    waited_ms = waited.as_millis() as u64,
                    "Lock acquisition finished"
                );
            }
        }

        result
    }
}

/// 锁策略注册表
///
/// 以 `Provider` 为 key 保存策略实例，所有策略通过 Arc 共享。
pub struct LockStrategies {
    strategies: HashMap<Provider, Arc<dyn LockStrategy>>,
    fallback: Arc<dyn LockStrategy>,
}

impl LockStrategies {
    /// 创建只包含不加锁回落策略的注册表
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: Arc::new(NoLockStrategy),
        }
    }

    /// 注册一个策略，已存在的同名 provider 会被替换
    pub fn register(&mut self, provider: Provider, strategy: Arc<dyn LockStrategy>) -> &mut Self {
        debug!(provider = %provider, backend = strategy.backend(), "注册锁策略");
        self.strategies.insert(provider, strategy);
        self
    }

    /// 按 provider 选择策略
    pub fn select(&self, provider: Provider) -> Arc<dyn LockStrategy> {
        self.strategies
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// 创建包含全部后端的注册表
    ///
    /// - redis -> RedisLockStrategy
    /// - postgres -> PgProviderLockStrategy
    /// - dapper -> PgAdvisoryLockStrategy
    pub fn with_backends(
        cache: lock_demo_shared::cache::Cache,
        pool: sqlx::PgPool,
        settings: &lock_demo_shared::config::LockSettings,
    ) -> Self {
        use crate::lock::postgres::{PgAdvisoryLockStrategy, PgProviderLockStrategy};
        use crate::lock::redis_lock::RedisLockStrategy;

        let mut registry = Self::new();
        registry
            .register(
                Provider::Redis,
                Arc::new(RedisLockStrategy::new(cache, settings)),
            )
            .register(
                Provider::PostgresProvider,
                Arc::new(PgProviderLockStrategy::new(pool.clone(), settings.poll_interval())),
            )
            .register(
                Provider::PostgresAdvisory,
                Arc::new(PgAdvisoryLockStrategy::new(pool, settings.poll_interval())),
            );

        info!(strategy_count = registry.len(), "锁策略初始化完成");
        registry
    }
}

impl Default for LockStrategies {
    fn default() -> Self {
        Self::new()
    }
}
