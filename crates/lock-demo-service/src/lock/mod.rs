//! 互斥锁策略
//!
//! 提供统一的"限时加锁"抽象和多种后端实现：
//!
//! - `NoLockStrategy`：不加锁，立即返回
//! - `BusyRegistry`：进程内单飞守卫，冲突时立即返回
//! - `RedisLockStrategy`：Redis SET NX PX 分布式锁
//! - `PgProviderLockStrategy` / `PgAdvisoryLockStrategy`：PostgreSQL 会话级 advisory lock
//!
//! 所有成功的加锁都返回 `LockHandle`，释放幂等，且在句柄被 drop 时保证释放。

mod busy;
mod handle;
mod noop;
mod postgres;
mod redis_lock;
mod strategy;
#[cfg(test)]
pub(crate) mod testing;

pub use busy::BusyRegistry;
pub use handle::{LockHandle, LockRelease};
pub use noop::NoLockStrategy;
pub(crate) use postgres::{AdvisoryKey, acquire_session_lock};
pub use postgres::{PgAdvisoryLockStrategy, PgProviderLockStrategy, advisory_key};
pub use redis_lock::RedisLockStrategy;
pub use strategy::{LockStrategies, LockStrategy};

#[cfg(test)]
pub(crate) use handle::tests::CountingRelease;
#[cfg(test)]
pub use strategy::MockLockStrategy;
