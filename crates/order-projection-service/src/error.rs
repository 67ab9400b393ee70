//! 投影服务专用错误类型
//!
//! 在共享库 OrderError 基础上定义本服务特有的错误变体，
//! 区分「重复投递」「乱序到达」「schema 不兼容」三类
//! 消费端才会出现的情况。

use order_shared::error::OrderError;

/// 订单事件投影错误
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Kafka 重复投递时通过 applied_events 幂等账本识别出已应用的事件，
    /// 直接提交位点跳过
    #[error("事件已应用: {event_id}")]
    AlreadyApplied { event_id: String },

    /// 事件版本与投影当前版本之间存在空洞，不应用也不提交位点，
    /// 由消费循环原位重试，预算耗尽后送死信等待补发后重放
    #[error("事件乱序: 订单 {order_id} 收到版本 {version}，已应用到版本 {last_applied}")]
    OutOfOrder {
        order_id: String,
        version: i64,
        last_applied: i64,
    },

    /// 事件 schema 版本高于本服务支持的版本，升级部署前无法处理
    #[error("不支持的事件 schema 版本: {schema_version}")]
    UnsupportedSchema { schema_version: u16 },

    /// 透传共享库错误，避免在每个 match 分支手动转换
    #[error(transparent)]
    Shared(#[from] OrderError),
}

impl ProjectionError {
    /// 是否值得重试
    ///
    /// 乱序与瞬时故障靠重试恢复；重复与 schema 不兼容
    /// 重试无意义。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OutOfOrder { .. } => true,
            Self::Shared(e) => e.is_retryable(),
            Self::AlreadyApplied { .. } | Self::UnsupportedSchema { .. } => false,
        }
    }
}

impl From<sqlx::Error> for ProjectionError {
    fn from(e: sqlx::Error) -> Self {
        Self::Shared(OrderError::Database(e))
    }
}

/// 投影服务 Result 类型别名
pub type Result<T> = std::result::Result<T, ProjectionError>;
