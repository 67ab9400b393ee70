//! Kafka 消费者与事件分发
//!
//! 将 Kafka 消息解码为订单事件，经过因果门禁后应用到投影表。
//! 位点提交遵循「先应用、后提交」：
//! - 应用成功或识别为重复 -> 提交位点
//! - 乱序或瞬时故障 -> 不提交，消费循环原位重试同一条消息
//! - 无法解码或重试预算耗尽的消息 -> 送入死信队列后提交，放行分区
//!
//! Kafka 位点是分区级水位，跳过失败消息去提交后续消息会把水位
//! 推过它造成丢失，因此每条消息必须以 Ok（提交）或死信（保全后
//! 提交）收尾，Err 只表示「原位再试一次」。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use order_shared::config::AppConfig;
use order_shared::dlq::DlqProducer;
use order_shared::error::OrderError;
use order_shared::events::{EVENT_SCHEMA_VERSION, OrderEvent};
use order_shared::kafka::{ConsumerMessage, KafkaConsumer, topics};

use crate::error::ProjectionError;
use crate::projector::EventApplier;

/// 同一事件进入死信前允许的应用尝试次数
const MAX_APPLY_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// DeadLetterSink — 死信投递抽象
// ---------------------------------------------------------------------------

/// 死信投递抽象
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// 将无法处理的消息连同失败上下文写入死信队列
    async fn send(
        &self,
        message_id: &str,
        payload: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), OrderError>;
}

#[async_trait]
impl DeadLetterSink for DlqProducer {
    async fn send(
        &self,
        message_id: &str,
        payload: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), OrderError> {
        self.send_to_dlq(message_id, topics::ORDER_EVENTS, payload, error, attempts)
            .await
    }
}

// ---------------------------------------------------------------------------
// ConsumerState — 生命周期标记
// ---------------------------------------------------------------------------

/// 消费者生命周期状态，仅用于日志标记运行阶段
///
/// 分区重平衡由 rdkafka 内部处理并记录，重平衡恢复后
/// 仍处于 Consuming。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
    Consuming,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Consuming => "consuming",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// OrderEventConsumer
// ---------------------------------------------------------------------------

/// 订单事件消费者
///
/// 组合 KafkaConsumer（消息拉取）、EventApplier（投影应用）和
/// DeadLetterSink（毒消息兜底）三个组件，形成完整的消费管道。
pub struct OrderEventConsumer {
    consumer: KafkaConsumer,
    applier: Arc<dyn EventApplier>,
    dlq: Arc<dyn DeadLetterSink>,
    /// 进程内的每事件失败计数，进程重启后清零重新计数
    attempts: Arc<DashMap<String, u32>>,
    max_attempts: u32,
}

impl OrderEventConsumer {
    pub fn new(
        config: &AppConfig,
        applier: Arc<dyn EventApplier>,
        dlq: Arc<dyn DeadLetterSink>,
    ) -> Result<Self, ProjectionError> {
        let consumer = KafkaConsumer::new(&config.kafka, None)?;
        Ok(Self {
            consumer,
            applier,
            dlq,
            attempts: Arc::new(DashMap::new()),
            max_attempts: MAX_APPLY_ATTEMPTS,
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    ///
    /// 将各组件移入闭包，通过 KafkaConsumer::start 驱动消费循环。
    /// 单独抽取 handle_message 函数方便单元测试。
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ProjectionError> {
        info!(state = %ConsumerState::Connecting, "订单事件消费者启动中");

        self.consumer.subscribe(&[topics::ORDER_EVENTS])?;
        info!(
            state = %ConsumerState::Subscribed,
            topic = topics::ORDER_EVENTS,
            "已订阅订单事件流"
        );

        let applier = self.applier;
        let dlq = self.dlq;
        let attempts = self.attempts;
        let max_attempts = self.max_attempts;

        info!(state = %ConsumerState::Consuming, "进入消费循环");
        self.consumer
            .start(shutdown, |msg| {
                let applier = applier.clone();
                let dlq = dlq.clone();
                let attempts = attempts.clone();
                async move {
                    handle_message(applier.as_ref(), dlq.as_ref(), &attempts, max_attempts, &msg)
                        .await
                }
            })
            .await;

        info!(state = %ConsumerState::Disconnected, "订单事件消费者已停止");
        Ok(())
    }
}

/// 处理单条 Kafka 消息的完整流程
///
/// 拆分为独立函数而非方法，便于在测试中直接调用而无需构造完整的 Consumer。
/// 返回值决定位点是否前移：Ok 提交，Err 不提交、由消费循环原位重试。
pub async fn handle_message(
    applier: &dyn EventApplier,
    dlq: &dyn DeadLetterSink,
    attempts: &DashMap<String, u32>,
    max_attempts: u32,
    msg: &ConsumerMessage,
) -> Result<(), ProjectionError> {
    // 1. 反序列化事件信封。解码失败的消息重试无意义，直接送死信并放行
    let event: OrderEvent = match msg.deserialize_payload() {
        Ok(event) => event,
        Err(e) => {
            warn!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "事件解码失败，发送到死信队列"
            );
            let message_id = msg
                .key
                .clone()
                .unwrap_or_else(|| format!("{}-{}@{}", msg.topic, msg.partition, msg.offset));
            let payload = String::from_utf8_lossy(&msg.payload).into_owned();
            // 死信写入失败时不提交位点，由消费循环原位重试
            dlq.send(&message_id, &payload, &e.to_string(), 1).await?;
            return Ok(());
        }
    };

    debug!(
        event_id = %event.event_id,
        order_id = %event.order_id,
        version = event.version,
        kind = %event.kind,
        "收到订单事件"
    );

    // 2. schema 门禁：高于本服务支持的版本无法安全应用
    if event.schema_version > EVENT_SCHEMA_VERSION {
        let err = ProjectionError::UnsupportedSchema {
            schema_version: event.schema_version,
        };
        warn!(event_id = %event.event_id, error = %err, "发送到死信队列");
        let payload = String::from_utf8_lossy(&msg.payload).into_owned();
        dlq.send(&event.event_id, &payload, &err.to_string(), 1)
            .await?;
        return Ok(());
    }

    // 3. 应用到投影
    match applier.apply(&event).await {
        Ok(()) => {
            attempts.remove(&event.event_id);
            info!(
                event_id = %event.event_id,
                order_id = %event.order_id,
                version = event.version,
                "订单事件已应用"
            );
            Ok(())
        }
        // 重复投递：投影已包含该事件的效果，提交位点跳过
        Err(ProjectionError::AlreadyApplied { event_id }) => {
            debug!(event_id, "事件重复投递，跳过");
            attempts.remove(&event_id);
            Ok(())
        }
        // 应用失败：乱序与瞬时故障都交给消费循环原位重试，预算内
        // 返回 Err 不提交位点。超限后送死信保全并提交放行分区；
        // 乱序事件也走这条路，它的版本空洞无法被同分区后续消息
        // 在原位填补，留在死信里等上游补发后重放
        Err(e) => {
            let failed = {
                let mut entry = attempts.entry(event.event_id.clone()).or_insert(0);
                *entry += 1;
                *entry
            };

            if failed >= max_attempts {
                error!(
                    event_id = %event.event_id,
                    attempts = failed,
                    error = %e,
                    "事件处理次数超限，发送到死信队列"
                );
                let payload = String::from_utf8_lossy(&msg.payload).into_owned();
                dlq.send(&event.event_id, &payload, &e.to_string(), failed)
                    .await?;
                attempts.remove(&event.event_id);
                return Ok(());
            }

            match &e {
                ProjectionError::OutOfOrder { .. } => warn!(
                    event_id = %event.event_id,
                    attempts = failed,
                    max_attempts,
                    error = %e,
                    "事件乱序，位点未提交"
                ),
                _ => warn!(
                    event_id = %event.event_id,
                    attempts = failed,
                    max_attempts,
                    error = %e,
                    "应用订单事件失败，位点未提交"
                ),
            }
            Err(e)
        }
    }
}
