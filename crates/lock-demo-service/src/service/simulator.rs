//! 工作模拟器
//!
//! 用两段可取消的等待代替真实工作：预处理阶段和临界区阶段。
//! 等待通过 `Sleeper` 抽象执行，测试可以替换为不占用真实时间的实现。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{LockDemoError, Result};
use crate::tracker::{Step, StepTracker};

/// 可取消的等待
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// 等待指定时长，取消时返回 `LockDemoError::Cancelled`
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()>;
}

/// 基于 tokio 定时器的等待
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LockDemoError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// 工作模拟器
#[derive(Clone)]
pub struct WorkSimulator {
    sleeper: Arc<dyn Sleeper>,
}

impl WorkSimulator {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    /// 执行 Start -> 预处理 -> Critical -> 临界区 -> Done
    ///
    /// 取消时不会标记 Done，已记录的步骤保留。
    pub async fn execute(
        &self,
        pre_phase: Duration,
        critical_phase: Duration,
        tracker: &mut StepTracker,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracker.mark(Step::Start);
        self.sleeper.sleep(pre_phase, cancel).await?;
        tracker.mark(Step::Critical);
        self.sleeper.sleep(critical_phase, cancel).await?;
        tracker.mark(Step::Done);
        Ok(())
    }
}

impl Default for WorkSimulator {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 只记录等待时长，立即返回
    #[derive(Default)]
    struct RecordingSleeper {
        calls: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
            if cancel.is_cancelled() {
                return Err(LockDemoError::Cancelled);
            }
            self.calls.lock().unwrap().push(duration);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_execute_with_recording_sleeper() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let simulator = WorkSimulator::new(sleeper.clone());
        let mut tracker = StepTracker::new();

        simulator
            .execute(
                Duration::from_millis(300),
                Duration::from_millis(2000),
                &mut tracker,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(tracker.steps(), &["Start", "Critical", "Done"]);
        assert_eq!(
            *sleeper.calls.lock().unwrap(),
            vec![Duration::from_millis(300), Duration::from_millis(2000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timing() {
        let simulator = WorkSimulator::default();
        let mut tracker = StepTracker::new();

        simulator
            .execute(
                Duration::from_millis(300),
                Duration::from_millis(2000),
                &mut tracker,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(tracker.steps(), &["Start", "Critical", "Done"]);
        assert_eq!(tracker.timestamps(), &[0, 300, 2300]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_critical_phase() {
        let simulator = WorkSimulator::default();
        let cancel = CancellationToken::new();
        let mut tracker = StepTracker::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let err = simulator
            .execute(
                Duration::from_millis(300),
                Duration::from_millis(2000),
                &mut tracker,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(tracker.steps(), &["Start", "Critical"]);
        assert!(!tracker.contains(Step::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_durations() {
        let simulator = WorkSimulator::default();
        let mut tracker = StepTracker::new();

        simulator
            .execute(
                Duration::ZERO,
                Duration::ZERO,
                &mut tracker,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(tracker.timestamps(), &[0, 0, 0]);
    }
}
