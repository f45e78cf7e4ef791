//! 步骤记录器
//!
//! 按发生顺序记录一次运行中的检查点及其相对耗时（毫秒）。
//! 每个参与者独占一个记录器，不跨参与者共享。

use std::fmt;

use tokio::time::Instant;

/// 预定义步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Critical,
    Done,
    Blocked,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Critical => "Critical",
            Self::Done => "Done",
            Self::Blocked => "Blocked",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        step.as_str().to_string()
    }
}

/// 步骤记录器
///
/// 时间基准为记录器创建时刻。使用 tokio 时钟，测试中可通过暂停时钟精确控制。
#[derive(Debug)]
pub struct StepTracker {
    created: Instant,
    steps: Vec<String>,
    timestamps: Vec<u64>,
}

impl StepTracker {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            steps: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    /// 追加一个步骤
    pub fn mark(&mut self, label: impl Into<String>) {
        let elapsed = self.created.elapsed().as_millis() as u64;
        self.steps.push(label.into());
        self.timestamps.push(elapsed);
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    pub fn contains(&self, step: Step) -> bool {
        self.steps.iter().any(|s| s == step.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for StepTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_tracker() {
        let tracker = StepTracker::new();
        assert!(tracker.is_empty());
        assert!(tracker.steps().is_empty());
        assert!(tracker.timestamps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_are_index_aligned() {
        let mut tracker = StepTracker::new();
        tracker.mark(Step::Start);
        tokio::time::sleep(Duration::from_millis(300)).await;
        tracker.mark(Step::Critical);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        tracker.mark("Done");

        assert_eq!(tracker.steps(), &["Start", "Critical", "Done"]);
        assert_eq!(tracker.timestamps(), &[0, 300, 2300]);
        assert_eq!(tracker.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_relative_to_creation() {
        let mut tracker = StepTracker::new();
        tokio::time::sleep(Duration::from_millis(40)).await;
        tracker.mark(Step::Start);
        tracker.mark(Step::Blocked);

        assert_eq!(tracker.timestamps(), &[40, 40]);
        assert!(tracker.contains(Step::Blocked));
        assert!(!tracker.contains(Step::Done));
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(Step::Start.to_string(), "Start");
        assert_eq!(String::from(Step::Blocked), "Blocked");
    }
}
