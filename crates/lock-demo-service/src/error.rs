//! 锁演示服务错误类型
//!
//! 区分三类结果：锁竞争（Conflict）、取消（Cancelled）、后端故障（Database/Redis/Infra/Internal）。
//! 竞争是预期内的业务结果，故障则意味着后端不可用，两者不能混淆。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lock_demo_shared::error::InfraError;
use serde_json::json;

/// 锁演示服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum LockDemoError {
    // 业务结果
    #[error("资源正被占用: {key}")]
    Conflict { key: String },
    #[error("操作已取消")]
    Cancelled,
    #[error("参数验证失败: {0}")]
    Validation(String),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Redis错误: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("基础设施错误: {0}")]
    Infra(#[from] InfraError),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl LockDemoError {
    /// 构造锁冲突错误
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Conflict { .. } => StatusCode::CONFLICT,
            // 取消只发生在服务关闭或客户端断开时
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Redis(_) | Self::Infra(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "LOCK_CONFLICT",
            Self::Cancelled => "CANCELLED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Infra(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// 是否为后端故障（非竞争、非取消、非参数错误）
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Redis(_) | Self::Infra(_) | Self::Internal(_)
        )
    }
}

impl IntoResponse for LockDemoError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Redis(e) => {
                tracing::error!(error = %e, "Redis 操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Infra(e) => {
                tracing::error!(error = %e, "基础设施故障");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, LockDemoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (LockDemoError::conflict("order:demo"), StatusCode::CONFLICT, "LOCK_CONFLICT"),
            (LockDemoError::Cancelled, StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
            (
                LockDemoError::Validation("key".to_string()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                LockDemoError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
            ),
            (
                LockDemoError::Internal("x".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{:?}", err);
            assert_eq!(err.error_code(), code, "{:?}", err);
        }
    }

    #[test]
    fn test_conflict_is_not_fault() {
        assert!(!LockDemoError::conflict("k").is_fault());
        assert!(!LockDemoError::Cancelled.is_fault());
        assert!(LockDemoError::Cancelled.is_cancelled());
        assert!(LockDemoError::Database(sqlx::Error::PoolTimedOut).is_fault());
    }

    #[test]
    fn test_infra_error_code_passthrough() {
        let err = LockDemoError::from(InfraError::Internal("boom".to_string()));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(err.is_fault());
    }

    #[tokio::test]
    async fn test_conflict_response_body() {
        let response = LockDemoError::conflict("order:demo").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["code"], "LOCK_CONFLICT");
        assert!(value["message"].as_str().unwrap().contains("order:demo"));
    }

    #[tokio::test]
    async fn test_system_error_message_is_masked() {
        let response = LockDemoError::Internal("secret detail".to_string()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(!value["message"].as_str().unwrap().contains("secret"));
    }
}
