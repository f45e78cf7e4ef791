//! 不加锁策略
//!
//! 未识别的 provider 回落到此策略，总是立即返回一个无副作用的句柄。

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{LockDemoError, Result};
use crate::lock::handle::{LockHandle, LockRelease};
use crate::lock::strategy::LockStrategy;

const BACKEND: &str = "none";

/// 不加锁策略
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLockStrategy;

struct NoopRelease;

#[async_trait]
impl LockRelease for NoopRelease {
    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl LockStrategy for NoLockStrategy {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn acquire_within(
        &self,
        key: &str,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>> {
        if cancel.is_cancelled() {
            return Err(LockDemoError::Cancelled);
        }
        Ok(Some(LockHandle::new(key, BACKEND, NoopRelease)))
    }
}
