//! 锁句柄
//!
//! 持有一次成功加锁的 RAII 包装器。释放是幂等的：第一次 `release()` 真正释放底层资源，
//! 之后的调用都是空操作。

use async_trait::async_trait;
use lock_demo_shared::observability::metrics;
use tracing::{debug, warn};

use crate::error::Result;

/// 底层锁资源的释放动作
///
/// 每个后端实现自己的释放逻辑，只会被调用一次。
#[async_trait]
pub trait LockRelease: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

/// 锁句柄
///
/// ## 注意事项
///
/// 建议显式调用 `release()`。句柄在未释放的情况下被 drop（例如所在 future 被取消）时，
/// 会把释放动作投递到当前 tokio 运行时后台执行，保证锁不会因取消而泄漏。
pub struct LockHandle {
    key: String,
    backend: &'static str,
    releaser: Option<Box<dyn LockRelease>>,
}

impl LockHandle {
    pub fn new(key: impl Into<String>, backend: &'static str, releaser: impl LockRelease + 'static) -> Self {
        Self {
            key: key.into(),
            backend,
            releaser: Some(Box::new(releaser)),
        }
    }

    /// 获取锁的 key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 获取锁后端名称
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// 是否已释放
    pub fn is_released(&self) -> bool {
        self.releaser.is_none()
    }

    /// 释放锁
    ///
    /// 重复调用是空操作，不会报错。
    pub async fn release(&mut self) -> Result<()> {
        let Some(releaser) = self.releaser.take() else {
            debug!(key = %self.key, backend = self.backend, "Lock already released");
            return Ok(());
        };

        match releaser.release().await {
            Ok(()) => {
                metrics::record_lock_release(self.backend, "ok");
                debug!(key = %self.key, backend = self.backend, "Lock released");
                Ok(())
            }
            Err(e) => {
                metrics::record_lock_release(self.backend, "error");
                warn!(key = %self.key, backend = self.backend, error = %e, "Lock release failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("backend", &self.backend)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let Some(releaser) = self.releaser.take() else {
            return;
        };

        let key = std::mem::take(&mut self.key);
        let backend = self.backend;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(key = %key, backend, "LockHandle dropped without release, releasing in background");
                runtime.spawn(async move {
                    match releaser.release().await {
                        Ok(()) => metrics::record_lock_release(backend, "ok"),
                        Err(e) => {
                            metrics::record_lock_release(backend, "error");
                            warn!(key = %key, backend, error = %e, "Background lock release failed");
                        }
                    }
                });
            }
            Err(_) => {
                // 没有运行时无法执行异步释放，只能依赖后端自身的过期或会话结束
                warn!(key = %key, backend, "LockHandle dropped outside runtime, lock not released");
            }
        }
    }
}
