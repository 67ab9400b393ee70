//! 订单变更编排
//!
//! 变更顺序固定为「先持久化、后发布」：发布失败永远不会留下
//! 一条指向未提交记录的事件。代价是可能出现「已落库但发布失败」
//! 的缺口——该缺口不隐藏，以 PartialSuccess 显式上报，
//! 并提供 republish 从存储状态手动补发。

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use order_shared::error::{OrderError, Result};
use order_shared::events::{EventKind, Order, OrderEvent, OrderStatus};
use order_shared::retry::{RetryPolicy, retry_with_policy};

use super::EventPublisher;
use crate::repository::{OrderDraft, OrderFilter, OrderPatch, OrderStore, Pagination};

// ---------------------------------------------------------------------------
// MutationOutcome — 变更结果
// ---------------------------------------------------------------------------

/// 发布失败的上下文
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFailure {
    pub code: &'static str,
    pub message: String,
    /// 为 true 时调用方可稍后通过 republish 补发
    pub retryable: bool,
}

/// 变更操作的完整结果
///
/// `published = false` 即 PartialSuccess：存储变更已提交且不回滚，
/// 事件未能送达 broker。
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub order: Order,
    pub published: bool,
    pub publish_error: Option<PublishFailure>,
}

// ---------------------------------------------------------------------------
// OrderService
// ---------------------------------------------------------------------------

/// 订单服务
///
/// 组合存储（权威状态）、事件编码（纯函数）与发布器（尽力而为）。
/// Get/List 直接委托存储，不经过事件路径。
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    retry_policy: RetryPolicy,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn EventPublisher>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            publisher,
            retry_policy,
        }
    }

    /// 创建订单并发布 Created 事件
    pub async fn create(&self, draft: OrderDraft) -> Result<MutationOutcome> {
        let order = self.store.create(draft).await?;
        Ok(self.publish_after_commit(order, EventKind::Created).await)
    }

    /// 更新订单并发布 Updated 事件
    ///
    /// 存储层的 NotFound / VersionConflict / OrderDeleted 在发布
    /// 之前返回，此时没有任何事件被派生。
    pub async fn update(
        &self,
        id: &str,
        patch: OrderPatch,
        expected_version: i64,
    ) -> Result<MutationOutcome> {
        let order = self.store.update(id, patch, expected_version).await?;
        Ok(self.publish_after_commit(order, EventKind::Updated).await)
    }

    /// 逻辑删除订单并发布 Deleted 事件
    pub async fn delete(&self, id: &str, expected_version: i64) -> Result<MutationOutcome> {
        let order = self.store.delete(id, expected_version).await?;
        Ok(self.publish_after_commit(order, EventKind::Deleted).await)
    }

    /// 按 ID 查询，纯委托
    pub async fn get(&self, id: &str) -> Result<Order> {
        self.store.get(id).await
    }

    /// 列表查询，纯委托
    pub async fn list(&self, filter: OrderFilter, page: Pagination) -> Result<(Vec<Order>, i64)> {
        self.store.list(filter, page).await
    }

    /// 从存储当前状态补发事件
    ///
    /// PartialSuccess 之后的人工对账入口：重新编码当前
    /// (order_id, version) 并发布。版本号不变，event_id 与
    /// 首次（失败的）发布尝试完全一致，消费端天然去重。
    pub async fn republish(&self, id: &str) -> Result<MutationOutcome> {
        let order = self.store.get(id).await?;
        let kind = kind_for_status(order.status);
        Ok(self.publish_after_commit(order, kind).await)
    }

    /// 落库成功后的尽力而为发布
    ///
    /// 发布带有限重试预算的指数退避；耗尽后不回滚存储，
    /// 将失败上下文塞进结果返回。
    async fn publish_after_commit(&self, order: Order, kind: EventKind) -> MutationOutcome {
        let event = OrderEvent::encode(&order, kind);

        let result = retry_with_policy(
            &self.retry_policy,
            "publish_order_event",
            OrderError::is_retryable,
            || self.publisher.publish(&event),
        )
        .await;

        match result {
            Ok((partition, offset)) => {
                info!(
                    event_id = %event.event_id,
                    order_id = %event.order_id,
                    version = event.version,
                    kind = %event.kind,
                    partition,
                    offset,
                    "订单事件已发布"
                );
                MutationOutcome {
                    order,
                    published: true,
                    publish_error: None,
                }
            }
            Err(err) => {
                // 记录已提交，发布失败必须显式上报而非静默吞掉
                error!(
                    event_id = %event.event_id,
                    order_id = %event.order_id,
                    version = event.version,
                    code = err.code(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "订单事件发布失败，存储变更保留（PartialSuccess）"
                );
                MutationOutcome {
                    published: false,
                    publish_error: Some(PublishFailure {
                        code: err.code(),
                        message: err.to_string(),
                        retryable: err.is_retryable(),
                    }),
                    order,
                }
            }
        }
    }
}

/// 补发时按订单当前状态推断事件类型
fn kind_for_status(status: OrderStatus) -> EventKind {
    match status {
        OrderStatus::Created => EventKind::Created,
        OrderStatus::Updated => EventKind::Updated,
        OrderStatus::Deleted => EventKind::Deleted,
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
