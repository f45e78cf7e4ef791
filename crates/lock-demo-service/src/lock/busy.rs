//! 进程内单飞（single-flight）守卫
//!
//! 记录当前进程内正在执行的 key，同一个 key 同时只允许一个调用进入。
//! 注册表由调用方显式持有并注入，生命周期与进程相同。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LockDemoError, Result};
use crate::lock::handle::{LockHandle, LockRelease};
use crate::lock::strategy::LockStrategy;

const BACKEND: &str = "in-process";

/// 进程内占用表
///
/// 以 key 为索引，值为本次占用的令牌。插入与删除都在分片锁内完成，
/// 对所有并发调用方是原子的。
#[derive(Clone, Default)]
pub struct BusyRegistry {
    in_flight: Arc<DashMap<String, Uuid>>,
}

impl BusyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试占用 key
    ///
    /// key 已被占用时立即返回 None，不等待。
    pub fn try_enter(&self, key: &str) -> Option<LockHandle> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(_) => {
                debug!(key = %key, "Key already in flight");
                None
            }
            Entry::Vacant(slot) => {
                let token = Uuid::new_v4();
                slot.insert(token);
                let release = BusyRelease {
                    in_flight: self.in_flight.clone(),
                    key: key.to_string(),
                    token,
                };
                Some(LockHandle::new(key, BACKEND, release))
            }
        }
    }

    /// key 当前是否被占用
    pub fn is_busy(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

struct BusyRelease {
    in_flight: Arc<DashMap<String, Uuid>>,
    key: String,
    token: Uuid,
}

#[async_trait]
impl LockRelease for BusyRelease {
    async fn release(self: Box<Self>) -> Result<()> {
        // 只删除自己插入的条目
        let removed = self
            .in_flight
            .remove_if(&self.key, |_, token| *token == self.token);
        if removed.is_none() {
            debug!(key = %self.key, "In-flight entry already gone");
        }
        Ok(())
    }
}

#[async_trait]
impl LockStrategy for BusyRegistry {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    /// 进程内守卫不等待，忽略 timeout
    async fn acquire_within(
        &self,
        key: &str,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>> {
        if cancel.is_cancelled() {
            return Err(LockDemoError::Cancelled);
        }
        Ok(self.try_enter(key))
    }
}
