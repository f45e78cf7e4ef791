//! 业务服务层
//!
//! - `simulator`：可取消的两阶段工作模拟
//! - `race`：双参与者竞争运行
//! - `single`：单参与者运行（进程内单飞或分布式锁）
//! - `report`：夜间报表任务的互斥执行

mod race;
mod report;
mod simulator;
mod single;

pub use race::{RaceConfig, RaceCoordinator, RaceOutcome};
pub use report::{NightlyReportJob, ReportOutcome};
pub use simulator::{Sleeper, TokioSleeper, WorkSimulator};
pub use single::SingleRunner;
