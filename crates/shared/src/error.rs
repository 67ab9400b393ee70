//! 统一错误处理模块
//!
//! 定义订单系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 可重试与不可重试的区分直接驱动发布重试和死信队列的决策。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum OrderError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("订单未找到: order_id={id}")]
    NotFound { id: String },

    #[error("订单已存在: order_id={id}")]
    DuplicateKey { id: String },

    // ==================== 并发控制错误 ====================
    #[error("版本冲突: order_id={id} 期望版本 {expected}, 实际版本 {actual}")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("订单已删除，不允许继续变更: order_id={id}")]
    OrderDeleted { id: String },

    // ==================== 事件管道错误 ====================
    /// 记录已落库但事件编码失败，必须显式上报而非静默丢弃
    #[error("事件编码失败: {0}")]
    EncodeFailed(String),

    /// 瞬时的 broker/网络故障，调用方可按退避策略重试
    #[error("消息投递失败（可重试）: {0}")]
    Transport(String),

    /// broker 明确拒绝（如 schema 不合法），重试无意义
    #[error("消息被拒绝（不可重试）: {0}")]
    Rejected(String),

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, OrderError>;

impl OrderError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::OrderDeleted { .. } => "ORDER_DELETED",
            Self::EncodeFailed(_) => "ENCODE_FAILED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Rejected(_) => "REJECTED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有瞬时故障（网络抖动、连接池满）才值得重试；
    /// 业务错误（冲突、校验失败）重试只会得到相同结果。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = OrderError::NotFound {
            id: "ord-123".to_string(),
        };
        assert_eq!(err.code(), "NOT_FOUND");

        let err = OrderError::VersionConflict {
            id: "ord-123".to_string(),
            expected: 1,
            actual: 3,
        };
        assert_eq!(err.code(), "VERSION_CONFLICT");
    }

    #[test]
    fn test_is_retryable() {
        let transport = OrderError::Transport("broker 不可达".to_string());
        assert!(transport.is_retryable());

        let db_err = OrderError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let rejected = OrderError::Rejected("schema 校验失败".to_string());
        assert!(!rejected.is_retryable());

        let conflict = OrderError::VersionConflict {
            id: "ord-1".to_string(),
            expected: 2,
            actual: 5,
        };
        assert!(!conflict.is_retryable());

        let encode = OrderError::EncodeFailed("字段缺失".to_string());
        assert!(!encode.is_retryable());
    }

    #[test]
    fn test_version_conflict_display_contains_context() {
        let err = OrderError::VersionConflict {
            id: "ord-42".to_string(),
            expected: 2,
            actual: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("ord-42"));
        assert!(msg.contains('2'));
        assert!(msg.contains('4'));
    }
}
