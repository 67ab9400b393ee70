//! 订单表行映射
//!
//! `orders` 是系统中唯一的权威表，按 order_id 作主键。
//! 订单项以 JSONB 存储，核心管道不需要跨表关联。

use chrono::{DateTime, Utc};
use order_shared::events::{Order, OrderItem, OrderStatus};
use sqlx::types::Json;

/// `orders` 表的行结构
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub order_id: String,
    pub customer_name: String,
    pub items: Json<Vec<OrderItem>>,
    pub status: OrderStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            order_id: row.order_id,
            customer_name: row.customer_name,
            items: row.items.0,
            status: row.status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_into_order() {
        let now = Utc::now();
        let row = OrderRow {
            order_id: "ord-1".to_string(),
            customer_name: "李四".to_string(),
            items: Json(vec![OrderItem {
                product_id: "prod-9".to_string(),
                product_name: "显示器".to_string(),
                quantity: 1,
                unit_price: 1299.0,
            }]),
            status: OrderStatus::Created,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let order: Order = row.into();
        assert_eq!(order.order_id, "ord-1");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.version, 1);
        assert_eq!(order.status, OrderStatus::Created);
    }
}
