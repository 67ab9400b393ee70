//! 死信队列
//!
//! 投影端对同一事件的处理尝试超过上限后（poison event），将其发送到
//! 死信 topic 并放行分区，避免单条坏事件永久阻塞同分区的后续事件。
//! 死信消息保留完整原始负载与失败上下文，供人工排查和手动重放。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::OrderError;
use crate::events::OrderEvent;
use crate::kafka::{KafkaProducer, topics};

// ---------------------------------------------------------------------------
// DeadLetterMessage — 死信消息信封
// ---------------------------------------------------------------------------

/// 死信消息信封
///
/// 包装原始事件负载，附加失败原因、尝试次数等元数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// 原始事件 ID
    pub message_id: String,
    /// 原始 topic
    pub source_topic: String,
    /// 原始消息内容（JSON 序列化的字符串）
    pub payload: String,
    /// 最后一次失败的原因
    pub error: String,
    /// 进入死信前的处理尝试次数
    pub attempts: u32,
    /// 进入死信队列的时间
    pub dead_lettered_at: DateTime<Utc>,
    /// 来源服务
    pub source_service: String,
}

// ---------------------------------------------------------------------------
// DlqProducer — 将失败事件发送到死信队列
// ---------------------------------------------------------------------------

/// DLQ 生产者
///
/// 消费端在事件处理反复失败后调用此组件将事件写入死信队列，
/// 而非直接丢弃，保证消息最终会被人工处理或重放。
pub struct DlqProducer {
    producer: KafkaProducer,
    source_service: String,
}

impl DlqProducer {
    pub fn new(producer: KafkaProducer, source_service: &str) -> Self {
        Self {
            producer,
            source_service: source_service.to_string(),
        }
    }

    /// 将失败消息发送到死信队列
    pub async fn send_to_dlq(
        &self,
        message_id: &str,
        source_topic: &str,
        payload: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), OrderError> {
        let dlq_msg = DeadLetterMessage {
            message_id: message_id.to_string(),
            source_topic: source_topic.to_string(),
            payload: payload.to_string(),
            error: error.to_string(),
            attempts,
            dead_lettered_at: Utc::now(),
            source_service: self.source_service.clone(),
        };

        self.producer
            .send_json(topics::DEAD_LETTER_QUEUE, message_id, &dlq_msg)
            .await?;

        warn!(message_id, source_topic, error, attempts, "消息已发送到死信队列");

        Ok(())
    }

    /// 从 OrderEvent 构造死信消息并发送
    ///
    /// 便捷方法：自动提取 event_id 作为 message_id，
    /// 并将整个事件序列化为 payload。
    pub async fn send_event_to_dlq(
        &self,
        event: &OrderEvent,
        error: &str,
        attempts: u32,
    ) -> Result<(), OrderError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| OrderError::EncodeFailed(format!("序列化事件失败: {e}")))?;

        self.send_to_dlq(&event.event_id, topics::ORDER_EVENTS, &payload, error, attempts)
            .await
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_serialization() {
        let msg = DeadLetterMessage {
            message_id: "evt-002".to_string(),
            source_topic: "orders.order.events".to_string(),
            payload: r#"{"orderId":"ord-1"}"#.to_string(),
            error: "投影数据库连接失败".to_string(),
            attempts: 5,
            dead_lettered_at: Utc::now(),
            source_service: "order-projection-service".to_string(),
        };

        let json = serde_json::to_string(&msg).unwrap();

        // 验证 camelCase 序列化
        assert!(json.contains("messageId"));
        assert!(json.contains("sourceTopic"));
        assert!(json.contains("attempts"));
        assert!(json.contains("deadLetteredAt"));
        assert!(json.contains("sourceService"));

        let deserialized: DeadLetterMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.message_id, "evt-002");
        assert_eq!(deserialized.attempts, 5);
        assert_eq!(deserialized.source_service, "order-projection-service");
    }
}
