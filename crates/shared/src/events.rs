//! 订单领域模型与事件信封
//!
//! 定义订单记录、订单事件的统一信封格式以及纯函数式的事件编码。
//! 事件 ID 由 (order_id, version) 确定性派生，发布重试后重新编码
//! 得到完全相同的 ID，这是下游消费端幂等去重的基础。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// OrderStatus — 订单状态
// ---------------------------------------------------------------------------

/// 订单状态
///
/// `Deleted` 是终态：逻辑删除后记录保留、版本号继续有效，
/// 但不再允许任何变更操作。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum OrderStatus {
    /// 新建 - 首次创建后的初始状态
    #[default]
    Created,
    /// 已变更 - 至少经历过一次更新
    Updated,
    /// 已删除 - 逻辑删除，终态
    Deleted,
}

impl OrderStatus {
    /// 终态不接受后续变更
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Order / OrderItem — 订单记录
// ---------------------------------------------------------------------------

/// 订单项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
}

/// 订单记录
///
/// `version` 从 1 开始，每次成功变更严格 +1。它同时承担两个职责：
/// 乐观并发控制的比较令牌，以及事件流中按 order_id 的排序令牌。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// 订单总金额
    pub fn total_amount(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.unit_price * f64::from(item.quantity))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// EventKind / OrderEvent — 事件信封
// ---------------------------------------------------------------------------

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        };
        write!(f, "{s}")
    }
}

/// 当前事件 schema 版本，负载结构变更时递增
pub const EVENT_SCHEMA_VERSION: u16 = 1;

/// 订单事件信封
///
/// 每次订单变更落库后派生一条事件。事件本身不独立存储，
/// 消费端的投影是事件效果的持久化落点。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    /// 由 (order_id, version) 确定性派生，用于消费端去重
    pub event_id: String,
    pub schema_version: u16,
    pub order_id: String,
    /// 变更后的订单版本，同一 order_id 的事件按此字段排序
    pub version: i64,
    pub kind: EventKind,
    /// 变更后的完整订单快照
    pub order: Order,
    pub emitted_at: DateTime<Utc>,
}

impl OrderEvent {
    /// 从落库后的订单快照编码事件
    ///
    /// 纯函数，无 I/O。重复对同一 (order_id, version) 编码
    /// 产出相同的 event_id。
    pub fn encode(order: &Order, kind: EventKind) -> Self {
        Self {
            event_id: Self::deterministic_event_id(&order.order_id, order.version),
            schema_version: EVENT_SCHEMA_VERSION,
            order_id: order.order_id.clone(),
            version: order.version,
            kind,
            order: order.clone(),
            emitted_at: Utc::now(),
        }
    }

    /// 确定性事件 ID: hex(sha256("{order_id}:{version}"))
    pub fn deterministic_event_id(order_id: &str, version: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(order_id.as_bytes());
        hasher.update(b":");
        hasher.update(version.to_string().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
