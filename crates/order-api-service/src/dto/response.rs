//! 订单 API 响应 DTO 定义
//!
//! 所有 REST API 的响应体结构

use chrono::{DateTime, Utc};
use serde::Serialize;

use order_shared::events::{Order, OrderItem, OrderStatus};

use crate::service::{MutationOutcome, PublishFailure};

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    /// 创建分页响应
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// 订单响应 DTO
///
/// 比领域模型多一个派生字段 total_amount，方便客户端直接展示。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub order_id: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub version: i64,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderDto {
    fn from(order: Order) -> Self {
        let total_amount = order.total_amount();
        Self {
            order_id: order.order_id,
            customer_name: order.customer_name,
            items: order.items,
            status: order.status,
            version: order.version,
            total_amount,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// 发布失败详情 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFailureDto {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<PublishFailure> for PublishFailureDto {
    fn from(failure: PublishFailure) -> Self {
        Self {
            code: failure.code.to_string(),
            message: failure.message,
            retryable: failure.retryable,
        }
    }
}

/// 变更操作响应 DTO
///
/// `published = false` 表示存储变更已提交但事件发布失败，
/// 客户端可根据 publish_error.retryable 决定是否调用补发接口。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub order: OrderDto,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_error: Option<PublishFailureDto>,
}

impl From<MutationOutcome> for MutationResponse {
    fn from(outcome: MutationOutcome) -> Self {
        Self {
            order: OrderDto::from(outcome.order),
            published: outcome.published,
            publish_error: outcome.publish_error.map(PublishFailureDto::from),
        }
    }
}

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}
