//! 单参与者运行
//!
//! 流程：Start -> 准备阶段 -> Critical -> 取得互斥 -> 工作 -> Done
//!
//! - `useLock = false`：只使用进程内单飞守卫，key 已在执行中时立即返回冲突
//! - `useLock = true`：只使用 provider 对应的锁策略，超时未取得锁返回冲突

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::error::{LockDemoError, Result};
use crate::lock::{BusyRegistry, LockStrategies};
use crate::models::{RunRequest, RunResult};
use crate::service::simulator::WorkSimulator;
use crate::tracker::{Step, StepTracker};

/// 单参与者运行器
#[derive(Clone)]
pub struct SingleRunner {
    strategies: Arc<LockStrategies>,
    busy: BusyRegistry,
    simulator: WorkSimulator,
    pre_phase: Duration,
}

impl SingleRunner {
    pub fn new(
        strategies: Arc<LockStrategies>,
        busy: BusyRegistry,
        simulator: WorkSimulator,
        pre_phase: Duration,
    ) -> Self {
        Self {
            strategies,
            busy,
            simulator,
            pre_phase,
        }
    }

    /// 执行一次单参与者运行
    ///
    /// 取不到互斥时返回 `LockDemoError::Conflict`。
    #[instrument(skip(self, request, cancel), fields(actor = %request.actor, key = %request.key, use_lock = request.use_lock))]
    pub async fn run(&self, request: &RunRequest, cancel: &CancellationToken) -> Result<RunResult> {
        let sleeper = self.simulator.sleeper();
        let mut tracker = StepTracker::new();

        tracker.mark(Step::Start);
        sleeper.sleep(self.pre_phase, cancel).await?;
        tracker.mark(Step::Critical);

        let acquired = if request.use_lock {
            self.strategies
                .select(request.provider_kind())
                .try_acquire(&request.key, request.lock_timeout(), cancel)
                .await?
        } else {
            self.busy.try_enter(&request.key)
        };

        let Some(mut handle) = acquired else {
            info!("Run rejected, key is busy");
            return Err(LockDemoError::conflict(&request.key));
        };

        let worked = sleeper.sleep(request.work(), cancel).await;
        if worked.is_ok() {
            tracker.mark(Step::Done);
        }
        let released = handle.release().await;
        worked.and(released)?;

        Ok(RunResult::from_tracker(&request.actor, request, &tracker))
    }
}
