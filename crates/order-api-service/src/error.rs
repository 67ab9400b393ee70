//! 订单 API 服务错误类型定义
//!
//! HTTP 层的错误出口：把领域错误映射到状态码与稳定的错误码。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use order_shared::error::OrderError;

/// 订单 API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // 资源不存在
    #[error("订单不存在: {0}")]
    NotFound(String),
    #[error("订单已删除: {0}")]
    OrderDeleted(String),

    // 写冲突
    #[error("订单 ID 已存在: {0}")]
    DuplicateKey(String),
    #[error("版本冲突: 订单 {id} 期望版本 {expected}，当前版本 {actual}")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: i64,
    },

    // 验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    // 事件管道错误（仅 republish 等显式发布路径可能返回）
    #[error("事件传输失败: {0}")]
    Transport(String),
    #[error("broker 拒绝事件: {0}")]
    Rejected(String),

    // 系统错误
    #[error("事件编码失败: {0}")]
    EncodeFailed(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 逻辑删除后的订单对外等同不存在
            Self::NotFound(_) | Self::OrderDeleted(_) => StatusCode::NOT_FOUND,

            Self::DuplicateKey(_) | Self::VersionConflict { .. } => StatusCode::CONFLICT,

            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,

            Self::Transport(_) | Self::Rejected(_) => StatusCode::BAD_GATEWAY,

            Self::EncodeFailed(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::OrderDeleted(_) => "ORDER_DELETED",
            Self::DuplicateKey(_) => "DUPLICATE_KEY",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Rejected(_) => "REJECTED",
            Self::EncodeFailed(_) => "ENCODE_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志，防止信息泄露
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::EncodeFailed(e) => {
                tracing::error!(error = %e, "事件编码失败");
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

/// 从领域错误转换
///
/// 领域层不感知 HTTP，状态码映射集中在这一层完成。
impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound { id } => Self::NotFound(id),
            OrderError::OrderDeleted { id } => Self::OrderDeleted(id),
            OrderError::DuplicateKey { id } => Self::DuplicateKey(id),
            OrderError::VersionConflict {
                id,
                expected,
                actual,
            } => Self::VersionConflict {
                id,
                expected,
                actual,
            },
            OrderError::Validation(msg) => Self::Validation(msg),
            OrderError::Transport(msg) => Self::Transport(msg),
            OrderError::Rejected(msg) => Self::Rejected(msg),
            OrderError::EncodeFailed(msg) => Self::EncodeFailed(msg),
            OrderError::Database(e) => Self::Database(e),
            OrderError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从 JSON 序列化错误转换
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

/// HTTP 层 Result 类型别名
pub type Result<T> = std::result::Result<T, ApiError>;
