//! 事件到投影表的幂等应用
//!
//! 幂等与因果序由同一个数据库事务保证：applied_events 账本去重、
//! 投影行的当前版本做因果门禁、投影写入与账本写入一起提交。
//! 事务提交成功后位点才会前移，崩溃时最多重放、绝不丢失。

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, info, instrument};

use order_shared::events::OrderEvent;

use crate::error::{ProjectionError, Result};

// ---------------------------------------------------------------------------
// ApplyDecision — 因果门禁的纯判定
// ---------------------------------------------------------------------------

/// 对单条事件的应用判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyDecision {
    /// 版本恰好衔接，应用
    Apply,
    /// 账本中已有该事件，或版本不高于已应用版本，跳过并提交位点
    Duplicate,
    /// 版本与已应用版本之间有空洞，不应用、不提交位点
    OutOfOrder { last_applied: i64 },
}

/// 因果门禁判定，纯函数
///
/// `last_applied` 为 None 表示该订单尚无投影，此时只接受版本 1。
pub fn decide(already_seen: bool, last_applied: Option<i64>, version: i64) -> ApplyDecision {
    let last = last_applied.unwrap_or(0);

    if already_seen || version <= last {
        return ApplyDecision::Duplicate;
    }
    if version == last + 1 {
        return ApplyDecision::Apply;
    }
    ApplyDecision::OutOfOrder { last_applied: last }
}

// ---------------------------------------------------------------------------
// EventApplier — 应用侧抽象
// ---------------------------------------------------------------------------

/// 事件应用抽象
///
/// 消费管道只依赖这个缝，生产环境由 PgProjector 实现，测试中用替身。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventApplier: Send + Sync {
    /// 幂等地应用单条事件
    ///
    /// 重复事件返回 `AlreadyApplied`，乱序事件返回 `OutOfOrder`，
    /// 两者都不改变投影状态。
    async fn apply(&self, event: &OrderEvent) -> Result<()>;
}

// ---------------------------------------------------------------------------
// PgProjector
// ---------------------------------------------------------------------------

/// PostgreSQL 投影器
///
/// 去重检查、因果门禁和写入在同一事务内完成，`FOR UPDATE` 行锁
/// 串行化同一订单的并发应用。
pub struct PgProjector {
    pool: PgPool,
}

impl PgProjector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventApplier for PgProjector {
    #[instrument(skip(self, event), fields(event_id = %event.event_id, order_id = %event.order_id, version = event.version))]
    async fn apply(&self, event: &OrderEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let already_seen: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM applied_events WHERE event_id = $1)",
        )
        .bind(&event.event_id)
        .fetch_one(&mut *tx)
        .await?;

        let last_applied: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM order_projections WHERE order_id = $1 FOR UPDATE",
        )
        .bind(&event.order_id)
        .fetch_optional(&mut *tx)
        .await?;

        match decide(already_seen, last_applied, event.version) {
            ApplyDecision::Duplicate => {
                debug!("事件重复，跳过");
                Err(ProjectionError::AlreadyApplied {
                    event_id: event.event_id.clone(),
                })
            }
            ApplyDecision::OutOfOrder { last_applied } => Err(ProjectionError::OutOfOrder {
                order_id: event.order_id.clone(),
                version: event.version,
                last_applied,
            }),
            ApplyDecision::Apply => {
                sqlx::query(
                    r#"
                    INSERT INTO order_projections
                        (order_id, customer_name, items, status, version, item_count, total_amount, updated_at, projected_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                    ON CONFLICT (order_id) DO UPDATE SET
                        customer_name = EXCLUDED.customer_name,
                        items = EXCLUDED.items,
                        status = EXCLUDED.status,
                        version = EXCLUDED.version,
                        item_count = EXCLUDED.item_count,
                        total_amount = EXCLUDED.total_amount,
                        updated_at = EXCLUDED.updated_at,
                        projected_at = NOW()
                    "#,
                )
                .bind(&event.order.order_id)
                .bind(&event.order.customer_name)
                .bind(Json(&event.order.items))
                .bind(event.order.status)
                .bind(event.order.version)
                .bind(event.order.items.len() as i32)
                .bind(event.order.total_amount())
                .bind(event.order.updated_at)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "INSERT INTO applied_events (event_id, order_id, version, applied_at) \
                     VALUES ($1, $2, $3, NOW())",
                )
                .bind(&event.event_id)
                .bind(&event.order_id)
                .bind(event.version)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;

                info!(kind = %event.kind, "事件已应用到投影");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
