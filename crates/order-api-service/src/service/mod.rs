//! 服务层
//!
//! `OrderService` 编排存储、事件编码与发布；`EventPublisher` 是
//! 发布侧的抽象缝，生产环境由 KafkaProducer 实现，测试中用替身。

pub mod order_service;

use async_trait::async_trait;
use order_shared::error::Result;
use order_shared::events::OrderEvent;
use order_shared::kafka::{KafkaProducer, topics};

pub use order_service::{MutationOutcome, OrderService, PublishFailure};

/// 事件发布抽象
///
/// 对存储只追加、无读取权限：实现方拿到的是编码完成的事件，
/// 不持有任何存储句柄。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布单条事件，返回 (partition, offset)
    ///
    /// 以 order_id 为 key，保证同一订单的事件分区内有序。
    async fn publish(&self, event: &OrderEvent) -> Result<(i32, i64)>;
}

#[async_trait]
impl EventPublisher for KafkaProducer {
    async fn publish(&self, event: &OrderEvent) -> Result<(i32, i64)> {
        self.send_json(topics::ORDER_EVENTS, &event.order_id, event)
            .await
    }
}
