//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、错误映射和优雅关闭语义。
//!
//! 消费端关闭自动提交，改为 handler 成功后手动提交位点：
//! 崩溃发生在投递与提交之间时消息会被重新投递，保证端到端
//! 至少一次而非丢失。

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::OrderError;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理所有 Kafka topic 名称，防止字符串散落在各服务中导致拼写不一致
pub mod topics {
    pub const ORDER_EVENTS: &str = "orders.order.events";
    pub const DEAD_LETTER_QUEUE: &str = "orders.dlq";
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str, OrderError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| OrderError::Rejected(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, OrderError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| OrderError::Rejected(format!("负载反序列化失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer` 并提供类型安全的 JSON 发送方法，
/// 内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的）。
/// 发送以 order_id 为 key，保证同一订单的事件落在同一分区内有序。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// `message.timeout.ms` 限定单条消息的投递上限：超时后由上层
    /// 按重试预算决定重试或上报 PartialSuccess，而非无限等待。
    pub fn new(config: &KafkaConfig) -> Result<Self, OrderError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.send_timeout_ms.to_string())
            .create()
            .map_err(|e| OrderError::Transport(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self {
            producer,
            send_timeout: config.send_timeout(),
        })
    }

    /// 发送原始字节消息，返回 (partition, offset)
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), OrderError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| classify_kafka_error(&e))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    ///
    /// 序列化与网络发送拆分为两步：序列化失败是 EncodeFailed（不可重试），
    /// 网络失败是 Transport（可重试），便于上层分别处理。
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), OrderError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| OrderError::EncodeFailed(format!("序列化失败: {e}")))?;

        self.send(topic, key, &payload).await
    }
}

/// 将 rdkafka 错误映射为可重试/不可重试的错误变体
///
/// broker 明确拒绝的消息（超长、格式非法）重试无意义，归为 Rejected；
/// 其余（超时、网络、队列满）均视为瞬时故障。
fn classify_kafka_error(e: &rdkafka::error::KafkaError) -> OrderError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageSizeTooLarge)
        | Some(RDKafkaErrorCode::InvalidMessage)
        | Some(RDKafkaErrorCode::InvalidMessageSize)
        | Some(RDKafkaErrorCode::TopicAuthorizationFailed) => {
            OrderError::Rejected(format!("broker 拒绝消息: {e}"))
        }
        _ => OrderError::Transport(format!("发送消息失败: {e}")),
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 单条消息原位重试的退避区间
const HANDLER_RETRY_INITIAL: Duration = Duration::from_millis(500);
const HANDLER_RETRY_MAX: Duration = Duration::from_secs(10);

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer` 并提供基于 `watch` channel 的优雅关闭语义。
/// 自动提交已关闭，位点只在 handler 返回成功后提交。
///
/// Kafka 的已提交位点是分区级水位而非逐条确认：提交任何一条
/// 靠后的消息都会把该分区的位点推过前面所有未提交的消息，且
/// `stream()` 在会话内不会重新吐出已经消费过的位点。因此失败的
/// 消息必须原位重试直到 handler 返回 Ok（毒消息由 handler 送入
/// 死信后返回 Ok 放行），绝不能跳过它去提交后面的消息。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组，
    /// 例如 "order-projection" 和 "order-projection.dlq"。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Result<Self, OrderError> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            // 手动提交，保证位点只在投影应用成功后前移
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| OrderError::Transport(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), OrderError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| OrderError::Transport(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - 收到消息时调用 handler；失败则带退避原位重试同一条消息，
    ///   直到 handler 返回 Ok 才提交位点、继续消费下一条。跳过
    ///   失败消息去提交后续消息会把分区水位推过它，造成静默丢失。
    /// - 关闭信号变为 `true`（或 sender 被丢弃）时退出循环；
    ///   重试中的消息位点未提交，重启后从该位点重新投递。
    pub async fn start<F, Fut, E>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("Kafka 消费循环已启动");

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                changed = shutdown.changed() => {
                    // sender 被丢弃等同关闭，否则 changed() 会立即
                    // 返回 Err 导致循环空转
                    if changed.is_err() || *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    match msg_result {
                        Ok(borrowed_msg) => {
                            let msg = ConsumerMessage::from_borrowed(&borrowed_msg);
                            debug!(
                                topic = %msg.topic,
                                partition = msg.partition,
                                offset = msg.offset,
                                "收到 Kafka 消息"
                            );

                            if !retry_until_handled(&handler, msg, &mut shutdown).await {
                                info!("收到关闭信号，Kafka 消费循环退出");
                                break;
                            }

                            // 只有应用成功后位点才前移
                            if let Err(e) = self
                                .consumer
                                .commit_message(&borrowed_msg, CommitMode::Async)
                            {
                                warn!(
                                    error = %e,
                                    offset = borrowed_msg.offset(),
                                    "提交位点失败，消息可能被重新投递"
                                );
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                        }
                    }
                }
            }
        }
    }
}

/// 原位重试单条消息直到 handler 返回 Ok
///
/// 返回 true 表示消息已处理完结（可以提交位点）；返回 false 表示
/// 重试期间收到关闭信号，位点保持未提交，留待重启后重新投递。
/// handler 自身负责在重试预算耗尽后把毒消息送入死信并返回 Ok，
/// 因此对可恢复故障（如投影库暂时不可达）这里会一直等下去。
async fn retry_until_handled<F, Fut, E>(
    handler: &F,
    msg: ConsumerMessage,
    shutdown: &mut watch::Receiver<bool>,
) -> bool
where
    F: Fn(ConsumerMessage) -> Fut,
    Fut: std::future::Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut backoff = HANDLER_RETRY_INITIAL;

    loop {
        match handler(msg.clone()).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(
                    error = %e,
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    backoff_ms = backoff.as_millis() as u64,
                    "处理 Kafka 消息失败，位点未提交，退避后原位重试"
                );

                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return false;
                        }
                    }

                    _ = tokio::time::sleep(backoff) => {}
                }

                backoff = (backoff * 2).min(HANDLER_RETRY_MAX);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_constants() {
        assert_eq!(topics::ORDER_EVENTS, "orders.order.events");
        assert_eq!(topics::DEAD_LETTER_QUEUE, "orders.dlq");
    }

    #[test]
    fn test_consumer_message_creation() {
        let msg = ConsumerMessage {
            topic: "test-topic".to_string(),
            partition: 0,
            offset: 42,
            key: Some("ord-1".to_string()),
            payload: b"hello".to_vec(),
            timestamp: Some(1_700_000_000_000),
            headers: HashMap::from([("trace-id".to_string(), "abc-123".to_string())]),
        };

        assert_eq!(msg.topic, "test-topic");
        assert_eq!(msg.partition, 0);
        assert_eq!(msg.offset, 42);
        assert_eq!(msg.key.as_deref(), Some("ord-1"));
        assert_eq!(msg.payload, b"hello");
        assert_eq!(msg.headers.get("trace-id").unwrap(), "abc-123");
    }

    #[test]
    fn test_consumer_message_deserialize() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Envelope {
            order_id: String,
            version: i64,
        }

        let json = r#"{"order_id":"ord-001","version":3}"#;
        let msg = ConsumerMessage {
            topic: "events".to_string(),
            partition: 1,
            offset: 100,
            key: None,
            payload: json.as_bytes().to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        };

        let envelope: Envelope = msg.deserialize_payload().unwrap();
        assert_eq!(
            envelope,
            Envelope {
                order_id: "ord-001".to_string(),
                version: 3,
            }
        );
    }

    #[test]
    fn test_consumer_message_deserialize_invalid_json() {
        let msg = ConsumerMessage {
            topic: "events".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: b"not json".to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        };

        let result: Result<serde_json::Value, _> = msg.deserialize_payload();
        // 无法解析的负载归为 Rejected，重试无意义
        assert!(matches!(result, Err(OrderError::Rejected(_))));
    }

    fn sample_msg(offset: i64) -> ConsumerMessage {
        ConsumerMessage {
            topic: "events".to_string(),
            partition: 0,
            offset,
            key: Some("ord-1".to_string()),
            payload: b"{}".to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_handled_retries_in_place_until_ok() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = AtomicU32::new(0);
        // sender 保持存活，否则 changed() 报错会被视为关闭
        let (_tx, mut shutdown) = watch::channel(false);

        let handled = retry_until_handled(
            &|_msg| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(OrderError::Transport("投影库不可达".to_string()))
                    } else {
                        Ok(())
                    }
                }
            },
            sample_msg(10),
            &mut shutdown,
        )
        .await;

        // 同一条消息原位重试直到成功，之后才允许提交位点
        assert!(handled);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_handled_stops_on_shutdown_signal() {
        let (tx, mut shutdown) = watch::channel(false);
        tx.send(true).unwrap();

        let handled = retry_until_handled(
            &|_msg| async { Err::<(), _>(OrderError::Transport("持续失败".to_string())) },
            sample_msg(11),
            &mut shutdown,
        )
        .await;

        // 关闭期间位点不提交，消息留待重启后重新投递
        assert!(!handled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_handled_stops_when_sender_dropped() {
        let (tx, mut shutdown) = watch::channel(false);
        drop(tx);

        let handled = retry_until_handled(
            &|_msg| async { Err::<(), _>(OrderError::Transport("持续失败".to_string())) },
            sample_msg(12),
            &mut shutdown,
        )
        .await;

        // sender 被丢弃等同关闭，不能空转重试
        assert!(!handled);
    }

    #[test]
    fn test_consumer_message_payload_str_invalid_utf8() {
        let msg = ConsumerMessage {
            topic: "test".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: vec![0xFF, 0xFE],
            timestamp: None,
            headers: HashMap::new(),
        };

        assert!(msg.payload_str().is_err());
    }
}
