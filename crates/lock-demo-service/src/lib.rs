//! 分布式互斥演示服务
//!
//! 演示多个并发请求争用同一个临界区（key）时，不同互斥机制的行为差异。
//!
//! ## 核心功能
//!
//! - **锁策略**：不加锁、进程内单飞守卫、Redis 分布式锁、两种 PostgreSQL advisory lock
//! - **工作模拟**：准备阶段 + 临界区阶段，每一步记录相对耗时
//! - **竞争运行**：X、Y 两个参与者错开启动，比较加锁前后的结果
//! - **夜间报表**：同一时间只允许一个实例执行的定时任务示例
//!
//! ## 模块结构
//!
//! - `tracker`: 步骤记录
//! - `lock`: 锁策略抽象与各后端实现
//! - `service`: 工作模拟、竞争协调、单参与者运行、报表任务
//! - `models`: 请求和响应模型
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `state`: 应用状态
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 存储：PostgreSQL (sqlx)、Redis
//! - 序列化：serde (camelCase)

pub mod error;
pub mod handlers;
pub mod lock;
pub mod models;
pub mod routes;
pub mod service;
pub mod state;
pub mod tracker;

pub use error::{LockDemoError, Result};
pub use lock::{LockHandle, LockStrategies, LockStrategy};
pub use models::{Provider, RaceResponse, RunRequest, RunResult, RunStatus};
pub use service::{NightlyReportJob, RaceCoordinator, ReportOutcome, SingleRunner, WorkSimulator};
pub use tracker::{Step, StepTracker};
