//! 订单 API 请求 DTO 定义
//!
//! 所有 REST API 的请求体与查询参数结构，校验规则集中在这里声明。

use serde::{Deserialize, Serialize};
use validator::Validate;

use order_shared::events::{OrderItem, OrderStatus};

use crate::repository::{OrderDraft, OrderFilter, OrderPatch, Pagination};

/// 订单行项输入
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    #[validate(length(min = 1, max = 64, message = "商品 ID 长度必须在 1-64 之间"))]
    pub product_id: String,
    #[validate(length(min = 1, max = 200, message = "商品名称长度必须在 1-200 之间"))]
    pub product_name: String,
    #[validate(range(min = 1, message = "数量必须大于 0"))]
    pub quantity: i32,
    #[validate(range(exclusive_min = 0.0, message = "单价必须大于 0"))]
    pub unit_price: f64,
}

impl From<OrderItemInput> for OrderItem {
    fn from(input: OrderItemInput) -> Self {
        Self {
            product_id: input.product_id,
            product_name: input.product_name,
            quantity: input.quantity,
            unit_price: input.unit_price,
        }
    }
}

/// 创建订单请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "客户名称长度必须在 1-100 之间"))]
    pub customer_name: String,
    #[validate(length(min = 1, message = "订单至少包含一个行项"), nested)]
    pub items: Vec<OrderItemInput>,
}

impl CreateOrderRequest {
    pub fn into_draft(self) -> OrderDraft {
        OrderDraft {
            customer_name: self.customer_name,
            items: self.items.into_iter().map(OrderItem::from).collect(),
        }
    }
}

/// 更新订单请求
///
/// 字段均为可选，省略的字段保持原值。expected_version 承担乐观并发
/// 控制，必须携带客户端最后读到的版本号。
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "客户名称长度必须在 1-100 之间"))]
    pub customer_name: Option<String>,
    #[validate(length(min = 1, message = "订单至少包含一个行项"), nested)]
    pub items: Option<Vec<OrderItemInput>>,
    #[validate(range(min = 1, message = "期望版本必须大于 0"))]
    pub expected_version: i64,
}

impl UpdateOrderRequest {
    pub fn into_patch(self) -> (OrderPatch, i64) {
        let patch = OrderPatch {
            customer_name: self.customer_name,
            items: self
                .items
                .map(|items| items.into_iter().map(OrderItem::from).collect()),
        };
        (patch, self.expected_version)
    }
}

/// 删除订单的查询参数
///
/// 删除同样走乐观并发：?expectedVersion=N
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOrderQuery {
    // 同时接受 snake_case 写法，方便 curl 手工调用
    #[serde(alias = "expected_version")]
    #[validate(range(min = 1, message = "期望版本必须大于 0"))]
    pub expected_version: i64,
}

/// 列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub customer: Option<String>,
    pub page: Option<i64>,
    #[serde(alias = "page_size")]
    pub page_size: Option<i64>,
}

impl ListOrdersQuery {
    pub fn filter(&self) -> OrderFilter {
        OrderFilter {
            status: self.status,
            customer: self.customer.clone(),
        }
    }

    /// 页码与页大小做夹取，越界值回落到合法区间而非报错
    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(defaults.page).max(1),
            page_size: self
                .page_size
                .unwrap_or(defaults.page_size)
                .clamp(1, 100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_item() -> OrderItemInput {
        OrderItemInput {
            product_id: "p-100".to_string(),
            product_name: "保温杯".to_string(),
            quantity: 1,
            unit_price: 59.9,
        }
    }

    #[test]
    fn test_create_request_valid() {
        let request = CreateOrderRequest {
            customer_name: "张三".to_string(),
            items: vec![valid_item()],
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_create_request_rejects_empty_items() {
        let request = CreateOrderRequest {
            customer_name: "张三".to_string(),
            items: vec![],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_create_request_rejects_invalid_nested_item() {
        // 行项校验失败必须冒泡到整单校验
        let mut item = valid_item();
        item.quantity = 0;
        let request = CreateOrderRequest {
            customer_name: "张三".to_string(),
            items: vec![item],
        };
        assert!(request.validate().is_err());

        let mut item = valid_item();
        item.unit_price = 0.0;
        let request = CreateOrderRequest {
            customer_name: "张三".to_string(),
            items: vec![item],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_update_request_partial_fields() {
        // 只改客户名、不带 items 是合法的
        let request = UpdateOrderRequest {
            customer_name: Some("李四".to_string()),
            items: None,
            expected_version: 2,
        };
        assert!(request.validate().is_ok());

        let (patch, expected_version) = request.into_patch();
        assert_eq!(patch.customer_name.as_deref(), Some("李四"));
        assert!(patch.items.is_none());
        assert_eq!(expected_version, 2);
    }

    #[test]
    fn test_update_request_rejects_zero_version() {
        let request = UpdateOrderRequest {
            customer_name: None,
            items: None,
            expected_version: 0,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_list_query_pagination_clamping() {
        let query = ListOrdersQuery {
            page: Some(0),
            page_size: Some(10_000),
            ..ListOrdersQuery::default()
        };
        let page = query.pagination();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);

        // 缺省时回落到默认值
        let page = ListOrdersQuery::default().pagination();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 20);
    }

    #[test]
    fn test_list_query_status_deserialization() {
        let query: ListOrdersQuery =
            serde_json::from_str(r#"{"status":"CREATED","customer":"张"}"#).unwrap();
        assert_eq!(query.status, Some(OrderStatus::Created));
        assert_eq!(query.customer.as_deref(), Some("张"));
    }

    #[test]
    fn test_camel_case_request_body() {
        let json = r#"{
            "customerName": "王五",
            "items": [
                {"productId": "p1", "productName": "茶杯", "quantity": 2, "unitPrice": 25.0}
            ]
        }"#;
        let request: CreateOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.customer_name, "王五");
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.items[0].product_id, "p1");
    }
}
