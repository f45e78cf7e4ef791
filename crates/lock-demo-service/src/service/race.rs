//! 竞争运行协调器
//!
//! 两个参与者 X、Y 以相同参数争用同一个 key，Y 比 X 晚 `stagger` 启动，
//! 两者作为独立任务并发执行，全部结束后汇总结果和组合状态。
//!
//! ## 参与者流程
//!
//! - `useLock = false`：直接执行工作模拟，不做互斥
//! - `useLock = true`：在 `lockTimeoutMs` 内加锁
//!   - 成功：持锁执行工作模拟，之后释放
//!   - 失败：记录 Start、Blocked，不执行工作
//!
//! 组合状态：任一参与者包含 Blocked 即为 409，否则为 200。

use std::sync::Arc;
use std::time::Duration;

use lock_demo_shared::config::DemoSettings;
use lock_demo_shared::observability::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{LockDemoError, Result};
use crate::lock::{LockStrategies, LockStrategy};
use crate::models::{RaceResponse, RunRequest, RunResult, RunStatus};
use crate::service::simulator::WorkSimulator;
use crate::tracker::{Step, StepTracker};

/// 竞争运行参数
#[derive(Debug, Clone, Copy)]
pub struct RaceConfig {
    /// 进入临界区前的准备阶段
    pub pre_phase: Duration,
    /// Y 相对 X 的启动延迟
    pub stagger: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self::from(&DemoSettings::default())
    }
}

impl From<&DemoSettings> for RaceConfig {
    fn from(settings: &DemoSettings) -> Self {
        Self {
            pre_phase: Duration::from_millis(settings.pre_phase_ms),
            stagger: Duration::from_millis(settings.stagger_ms),
        }
    }
}

/// 竞争运行结果
#[derive(Debug, Clone)]
pub struct RaceOutcome {
    pub first: RunResult,
    pub second: RunResult,
}

impl RaceOutcome {
    pub fn status(&self) -> RunStatus {
        RunStatus::combine([&self.first, &self.second])
    }

    pub fn into_response(self) -> RaceResponse {
        let status = self.status().as_u16();
        RaceResponse {
            x: self.first,
            y: self.second,
            status,
        }
    }
}

/// 单个参与者的执行上下文
struct Actor {
    name: &'static str,
    lead: Duration,
    request: RunRequest,
    strategy: Option<Arc<dyn LockStrategy>>,
    simulator: WorkSimulator,
    pre_phase: Duration,
    cancel: CancellationToken,
}

impl Actor {
    async fn run(self, mut tracker: StepTracker) -> (StepTracker, Result<()>) {
        let result = self.execute(&mut tracker).await;
        (tracker, result)
    }

    async fn execute(&self, tracker: &mut StepTracker) -> Result<()> {
        if !self.lead.is_zero() {
            self.simulator.sleeper().sleep(self.lead, &self.cancel).await?;
        }

        let Some(strategy) = &self.strategy else {
            return self
                .simulator
                .execute(self.pre_phase, self.request.work(), tracker, &self.cancel)
                .await;
        };

        let acquired = strategy
            .try_acquire(&self.request.key, self.request.lock_timeout(), &self.cancel)
            .await?;

        let Some(mut handle) = acquired else {
            info!(actor = self.name, key = %self.request.key, "Actor blocked");
            tracker.mark(Step::Start);
            tracker.mark(Step::Blocked);
            return Ok(());
        };

        let worked = self
            .simulator
            .execute(self.pre_phase, self.request.work(), tracker, &self.cancel)
            .await;
        // 无论工作是否成功都要释放锁
        let released = handle.release().await;
        worked.and(released)
    }
}

/// 竞争运行协调器
#[derive(Clone)]
pub struct RaceCoordinator {
    strategies: Arc<LockStrategies>,
    simulator: WorkSimulator,
    config: RaceConfig,
}

impl RaceCoordinator {
    pub fn new(strategies: Arc<LockStrategies>, simulator: WorkSimulator, config: RaceConfig) -> Self {
        Self {
            strategies,
            simulator,
            config,
        }
    }

    /// 执行一次竞争运行
    ///
    /// 两个参与者互不取消：一方出错时另一方照常运行到结束。
    /// `cancel` 被取消或本 future 被 drop 时，两个参与者都会被取消并释放已持有的锁。
    #[instrument(skip(self, request, cancel), fields(key = %request.key, provider = %request.provider))]
    pub async fn run(&self, request: &RunRequest, cancel: &CancellationToken) -> Result<RaceOutcome> {
        let strategy = request
            .use_lock
            .then(|| self.strategies.select(request.provider_kind()));

        let run_token = cancel.child_token();
        let _cancel_on_drop = run_token.clone().drop_guard();

        // 两个记录器同时创建，Y 的时间戳包含启动延迟
        let first_tracker = StepTracker::new();
        let second_tracker = StepTracker::new();

        let first = tokio::spawn(
            self.actor("X", Duration::ZERO, request, strategy.clone(), &run_token)
                .run(first_tracker),
        );
        let second = tokio::spawn(
            self.actor("Y", self.config.stagger, request, strategy, &run_token)
                .run(second_tracker),
        );

        let (first, second) = tokio::join!(first, second);
        let (first_tracker, first_result) =
            first.map_err(|e| LockDemoError::Internal(format!("actor X task failed: {e}")))?;
        let (second_tracker, second_result) =
            second.map_err(|e| LockDemoError::Internal(format!("actor Y task failed: {e}")))?;

        if first_result.as_ref().is_err_and(LockDemoError::is_cancelled)
            || second_result.as_ref().is_err_and(LockDemoError::is_cancelled)
        {
            return Err(LockDemoError::Cancelled);
        }
        if let Err(e) = &first_result {
            warn!(actor = "X", error = %e, sibling_ok = second_result.is_ok(), "Actor failed");
        }
        if let Err(e) = &second_result {
            warn!(actor = "Y", error = %e, sibling_ok = first_result.is_ok(), "Actor failed");
        }
        first_result?;
        second_result?;

        let outcome = RaceOutcome {
            first: RunResult::from_tracker("X", request, &first_tracker),
            second: RunResult::from_tracker("Y", request, &second_tracker),
        };

        let status = outcome.status();
        metrics::record_race_run(status.as_u16());
        info!(status = status.as_u16(), "Race finished");

        Ok(outcome)
    }

    fn actor(
        &self,
        name: &'static str,
        lead: Duration,
        request: &RunRequest,
        strategy: Option<Arc<dyn LockStrategy>>,
        cancel: &CancellationToken,
    ) -> Actor {
        Actor {
            name,
            lead,
            request: request.clone(),
            strategy,
            simulator: self.simulator.clone(),
            pre_phase: self.config.pre_phase,
            cancel: cancel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::testing::SemaphoreStrategy;
    use crate::lock::{BusyRegistry, CountingRelease, LockHandle, MockLockStrategy};
    use crate::models::Provider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator_with(provider: Provider, strategy: Arc<dyn LockStrategy>) -> RaceCoordinator {
        let mut strategies = LockStrategies::new();
        strategies.register(provider, strategy);
        RaceCoordinator::new(
            Arc::new(strategies),
            WorkSimulator::default(),
            RaceConfig::default(),
        )
    }

    fn locked_request(work_ms: u64, lock_timeout_ms: u64) -> RunRequest {
        RunRequest {
            use_lock: true,
            provider: "redis".to_string(),
            work_ms,
            lock_timeout_ms,
            ..Default::default()
        }
    }

    fn assert_well_formed(result: &RunResult) {
        assert_eq!(result.steps.len(), result.timestamps_ms.len());
        assert_eq!(result.steps.first().map(String::as_str), Some("Start"));
        assert!(result.timestamps_ms.windows(2).all(|w| w[0] <= w[1]));
        if result.is_blocked() {
            assert_eq!(result.steps.last().map(String::as_str), Some("Blocked"));
            assert!(!result.steps.iter().any(|s| s == "Done"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_lock_both_actors_finish() {
        let coordinator = coordinator_with(Provider::Redis, Arc::new(SemaphoreStrategy::new()));
        let request = RunRequest::default();

        let outcome = coordinator
            .run(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.first.actor, "X");
        assert_eq!(outcome.second.actor, "Y");
        assert_eq!(outcome.first.timestamps_ms, vec![0, 300, 2300]);
        assert_eq!(outcome.second.timestamps_ms, vec![40, 340, 2340]);
        assert!(outcome.first.is_done() && outcome.second.is_done());
        assert_eq!(outcome.status(), RunStatus::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_actor_waits_for_release() {
        let strategy = SemaphoreStrategy::new();
        let coordinator = coordinator_with(Provider::Redis, Arc::new(strategy.clone()));

        let outcome = coordinator
            .run(&locked_request(2000, 3000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.first.steps, vec!["Start", "Critical", "Done"]);
        assert_eq!(outcome.first.timestamps_ms, vec![0, 300, 2300]);
        // X 在 2300ms 释放，Y 随即获得锁
        assert_eq!(outcome.second.steps, vec!["Start", "Critical", "Done"]);
        assert_eq!(outcome.second.timestamps_ms, vec![2300, 2600, 4600]);
        assert_eq!(outcome.status(), RunStatus::Ok);
        assert!(!strategy.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_actor_blocked_when_timeout_too_short() {
        let strategy = SemaphoreStrategy::new();
        let coordinator = coordinator_with(Provider::Redis, Arc::new(strategy.clone()));

        let response = coordinator
            .run(&locked_request(2000, 1000), &CancellationToken::new())
            .await
            .unwrap()
            .into_response();

        assert!(response.x.is_done());
        assert_eq!(response.y.steps, vec!["Start", "Blocked"]);
        assert_eq!(response.y.timestamps_ms, vec![1040, 1040]);
        assert_eq!(response.status, 409);
        assert_well_formed(&response.x);
        assert_well_formed(&response.y);
        assert!(!strategy.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_process_guard_blocks_immediately() {
        let coordinator = coordinator_with(Provider::Redis, Arc::new(BusyRegistry::new()));

        let outcome = coordinator
            .run(&locked_request(2000, 3000), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.first.is_done());
        assert_eq!(outcome.second.steps, vec!["Start", "Blocked"]);
        assert_eq!(outcome.second.timestamps_ms, vec![40, 40]);
        assert_eq!(outcome.status(), RunStatus::Conflict);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_provider_runs_without_exclusion() {
        let coordinator = coordinator_with(Provider::Redis, Arc::new(BusyRegistry::new()));
        let request = RunRequest {
            provider: "mongo".to_string(),
            ..locked_request(100, 0)
        };

        let outcome = coordinator
            .run(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.first.is_done());
        assert!(outcome.second.is_done());
        assert_eq!(outcome.status(), RunStatus::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_in_one_actor_does_not_stop_sibling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));

        let mut mock = MockLockStrategy::new();
        mock.expect_backend().return_const("mock");
        let calls_in = calls.clone();
        let released_in = released.clone();
        mock.expect_try_acquire().returning(move |key, _, _| {
            // X 先到，第一次调用模拟后端故障
            if calls_in.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LockDemoError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(Some(LockHandle::new(
                    key,
                    "mock",
                    CountingRelease(released_in.clone()),
                )))
            }
        });

        let coordinator = coordinator_with(Provider::Redis, Arc::new(mock));
        let err = coordinator
            .run(&locked_request(2000, 3000), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_fault());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Y 仍然完成了工作并释放了锁
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_critical_releases_lock() {
        let strategy = SemaphoreStrategy::new();
        let coordinator = coordinator_with(Provider::Redis, Arc::new(strategy.clone()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            trigger.cancel();
        });

        let err = coordinator
            .run(&locked_request(2000, 3000), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        // 立即重新加锁必须成功
        let mut handle = strategy
            .try_acquire("order:demo", Duration::ZERO, &CancellationToken::new())
            .await
            .unwrap()
            .expect("lock should be free after cancellation");
        handle.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_cancels_actors() {
        let strategy = SemaphoreStrategy::new();
        let coordinator = coordinator_with(Provider::Redis, Arc::new(strategy.clone()));
        let request = locked_request(2000, 3000);

        let cancel = CancellationToken::new();

        let run = coordinator.run(&request, &cancel);
        let timed_out = tokio::time::timeout(Duration::from_millis(500), run).await;
        assert!(timed_out.is_err());

        // drop 后参与者任务收到取消并释放锁
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!strategy.is_held());
    }
}
