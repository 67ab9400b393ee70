//! 订单 API 的请求/响应 DTO
//!
//! DTO 与领域模型分离：请求侧承担参数校验，响应侧控制对外暴露的字段。

pub mod request;
pub mod response;

pub use request::{
    CreateOrderRequest, DeleteOrderQuery, ListOrdersQuery, OrderItemInput, UpdateOrderRequest,
};
pub use response::{
    ApiResponse, HealthResponse, MutationResponse, OrderDto, PageResponse, PublishFailureDto,
};
