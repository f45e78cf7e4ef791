//! Redis 分布式锁
//!
//! 使用 `SET key owner NX PX lease` 原子加锁，在超时时间内按固定间隔轮询；
//! 释放时通过 Lua 脚本校验 owner 后删除，避免误删其他客户端的锁。
//!
//! 持锁期间后台任务每隔 lease/3 续期一次，临界区再长也不会在持有时过期；
//! 进程崩溃后续期停止，锁在一个租期内自动失效。

use std::time::Duration;

use async_trait::async_trait;
use lock_demo_shared::cache::Cache;
use lock_demo_shared::config::LockSettings;
use redis::aio::MultiplexedConnection;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{LockDemoError, Result};
use crate::lock::handle::{LockHandle, LockRelease};
use crate::lock::strategy::LockStrategy;

const BACKEND: &str = "redis";

/// 只有 owner 匹配时才删除
const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// 只有 owner 匹配时才延长过期时间
const EXTEND_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// 续期间隔：租期的三分之一，至少 1ms
fn renewal_period(lease: Duration) -> Duration {
    (lease / 3).max(Duration::from_millis(1))
}

/// 续期循环，直到 stop 被取消或发现锁已不属于自己
async fn keep_alive(
    mut conn: MultiplexedConnection,
    lock_key: String,
    owner: String,
    lease: Duration,
    stop: CancellationToken,
) {
    let period = renewal_period(lease);
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(period) => {}
        }

        let extended: std::result::Result<i32, redis::RedisError> =
            redis::Script::new(EXTEND_SCRIPT)
                .key(&lock_key)
                .arg(&owner)
                .arg(lease.as_millis() as u64)
                .invoke_async(&mut conn)
                .await;

        match extended {
            Ok(1) => debug!(lock_key = %lock_key, "Redis lock lease extended"),
            Ok(_) => {
                if !stop.is_cancelled() {
                    warn!(lock_key = %lock_key, owner = %owner, "Redis lock lost before release");
                }
                return;
            }
            // 暂时性故障，下个周期再试
            Err(e) => warn!(lock_key = %lock_key, error = %e, "Redis lock lease extension failed"),
        }
    }
}

/// Redis 锁策略
pub struct RedisLockStrategy {
    cache: Cache,
    key_prefix: String,
    /// 锁的过期时间，持有者崩溃时锁最终会自动失效
    lease: Duration,
    poll_interval: Duration,
    /// 实例唯一标识，用于区分不同服务实例持有的锁
    instance_id: String,
}

impl RedisLockStrategy {
    pub fn new(cache: Cache, settings: &LockSettings) -> Self {
        Self {
            cache,
            key_prefix: settings.key_prefix.clone(),
            lease: settings.lease(),
            poll_interval: settings.poll_interval(),
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// owner 格式: instance_id:uuid
    fn new_owner(&self) -> String {
        format!("{}:{}", self.instance_id, Uuid::new_v4())
    }

    /// SET NX PX，成功时返回 "OK"，key 已存在时返回 nil
    async fn try_set(
        &self,
        conn: &mut MultiplexedConnection,
        lock_key: &str,
        owner: &str,
    ) -> Result<bool> {
        let result: Option<String> = redis::cmd("SET")
            .arg(lock_key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(self.lease.as_millis() as u64)
            .query_async(conn)
            .await?;
        Ok(result.is_some())
    }
}

#[async_trait]
impl LockStrategy for RedisLockStrategy {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self, cancel), fields(instance_id = %self.instance_id))]
    async fn acquire_within(
        &self,
        key: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>> {
        let deadline = Instant::now() + timeout;
        let lock_key = self.lock_key(key);
        let owner = self.new_owner();

        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LockDemoError::Cancelled),
            conn = self.cache.connection() => conn?,
        };

        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(LockDemoError::Cancelled);
            }

            attempts += 1;
            if self.try_set(&mut conn, &lock_key, &owner).await? {
                debug!(key = %key, owner = %owner, attempts, "Redis lock acquired");
                let stop = CancellationToken::new();
                tokio::spawn(keep_alive(
                    conn.clone(),
                    lock_key.clone(),
                    owner.clone(),
                    self.lease,
                    stop.clone(),
                ));
                let release = RedisRelease {
                    conn,
                    lock_key,
                    owner,
                    renewal: stop.drop_guard(),
                };
                return Ok(Some(LockHandle::new(key, BACKEND, release)));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(key = %key, attempts, "Redis lock not acquired before timeout");
                return Ok(None);
            }

            let wait = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LockDemoError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

/// 持有加锁时使用的连接，释放时复用
///
/// drop 时通过 `renewal` 停止续期任务。
struct RedisRelease {
    conn: MultiplexedConnection,
    lock_key: String,
    owner: String,
    renewal: DropGuard,
}

#[async_trait]
impl LockRelease for RedisRelease {
    async fn release(self: Box<Self>) -> Result<()> {
        let RedisRelease {
            mut conn,
            lock_key,
            owner,
            renewal,
        } = *self;
        // 先停续期，再删除
        drop(renewal);

        let deleted: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&lock_key)
            .arg(&owner)
            .invoke_async(&mut conn)
            .await?;

        if deleted == 0 {
            // 锁已过期或被其他客户端持有
            warn!(
                lock_key = %lock_key,
                owner = %owner,
                "Lock was already released or owned by another client"
            );
        }
        Ok(())
    }
}
