//! 订单 CRUD 处理器
//!
//! handler 只做三件事：反序列化并校验入参、调用服务层、组装响应。
//! 业务规则全部在服务层与存储层，这里不做任何判断。

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use validator::Validate;

use crate::dto::{
    ApiResponse, CreateOrderRequest, DeleteOrderQuery, ListOrdersQuery, MutationResponse,
    OrderDto, PageResponse, UpdateOrderRequest,
};
use crate::error::Result;
use crate::state::AppState;

/// 创建订单
///
/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let outcome = state.order_service.create(payload.into_draft()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(MutationResponse::from(outcome))),
    ))
}

/// 查询单个订单
///
/// GET /orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let order = state.order_service.get(&id).await?;

    Ok(Json(ApiResponse::success(OrderDto::from(order))))
}

/// 分页查询订单列表
///
/// GET /orders?status=CREATED&customer=张&page=1&pageSize=20
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse> {
    let page = query.pagination();
    let (orders, total) = state.order_service.list(query.filter(), page).await?;

    let items: Vec<OrderDto> = orders.into_iter().map(OrderDto::from).collect();
    let response = PageResponse::new(items, total, page.page, page.page_size);

    Ok(Json(ApiResponse::success(response)))
}

/// 更新订单
///
/// PUT /orders/{id}，请求体携带 expectedVersion 做乐观并发控制
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let (patch, expected_version) = payload.into_patch();
    let outcome = state
        .order_service
        .update(&id, patch, expected_version)
        .await?;

    Ok(Json(ApiResponse::success(MutationResponse::from(outcome))))
}

/// 逻辑删除订单
///
/// DELETE /orders/{id}?expectedVersion=N
///
/// 返回 200 带响应体而非 204：删除也可能发布失败，
/// 客户端需要从响应体得知 published 状态。
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteOrderQuery>,
) -> Result<impl IntoResponse> {
    query.validate()?;

    let outcome = state
        .order_service
        .delete(&id, query.expected_version)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        MutationResponse::from(outcome),
        "订单已删除",
    )))
}

/// 补发订单事件
///
/// POST /orders/{id}/republish
///
/// PartialSuccess 之后的对账入口：从存储当前状态重新编码并发布，
/// 不改变订单版本号。
pub async fn republish_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let outcome = state.order_service.republish(&id).await?;

    Ok(Json(ApiResponse::success(MutationResponse::from(outcome))))
}
