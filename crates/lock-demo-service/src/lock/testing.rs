//! 测试用内存锁
//!
//! 基于单个信号量，在超时内等待，行为与分布式后端一致但不依赖外部服务。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{LockDemoError, Result};
use crate::lock::{LockHandle, LockRelease, LockStrategy};

#[derive(Clone)]
pub(crate) struct SemaphoreStrategy {
    permits: Arc<Semaphore>,
}

impl SemaphoreStrategy {
    pub(crate) fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    pub(crate) fn is_held(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

struct PermitRelease(OwnedSemaphorePermit);

#[async_trait]
impl LockRelease for PermitRelease {
    async fn release(self: Box<Self>) -> Result<()> {
        drop(self.0);
        Ok(())
    }
}

#[async_trait]
impl LockStrategy for SemaphoreStrategy {
    fn backend(&self) -> &'static str {
        "semaphore"
    }

    async fn acquire_within(
        &self,
        key: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<LockHandle>> {
        let acquire = self.permits.clone().acquire_owned();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LockDemoError::Cancelled),
            acquired = tokio::time::timeout(timeout, acquire) => match acquired {
                Ok(Ok(permit)) => Ok(Some(LockHandle::new(key, "semaphore", PermitRelease(permit)))),
                Ok(Err(e)) => Err(LockDemoError::Internal(e.to_string())),
                Err(_) => Ok(None),
            },
        }
    }
}
