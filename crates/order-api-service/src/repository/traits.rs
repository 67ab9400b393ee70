//! 存储层 trait 定义
//!
//! 将存储契约抽象为 trait，服务层依赖抽象而非具体实现，
//! 单元测试中用 mockall 生成替身验证编排逻辑。

use async_trait::async_trait;
use order_shared::error::Result;
use order_shared::events::{Order, OrderItem, OrderStatus};

/// 新建订单的输入
///
/// order_id 与版本号由存储层分配，调用方不提供。
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub customer_name: String,
    pub items: Vec<OrderItem>,
}

/// 更新订单的补丁
///
/// 均为可选字段，None 表示保留原值。
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub customer_name: Option<String>,
    pub items: Option<Vec<OrderItem>>,
}

/// 列表查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// 客户名模糊匹配
    pub customer: Option<String>,
}

/// 分页参数
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.page_size
    }
}

/// 订单存储契约
///
/// 所有变更操作对 `version` 原子：读到版本 V 的调用方提交变更时，
/// 若存储中的版本已越过 V 则必须拒绝（VersionConflict）。
/// 每个成功的变更返回变更后的订单（含新版本号），该值即事件编码的输入。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 创建订单，分配 order_id 并置 version = 1
    async fn create(&self, draft: OrderDraft) -> Result<Order>;

    /// 按 ID 查询（包含已逻辑删除的记录）
    async fn get(&self, id: &str) -> Result<Order>;

    /// 带版本校验的更新，成功后 version + 1
    async fn update(&self, id: &str, patch: OrderPatch, expected_version: i64) -> Result<Order>;

    /// 逻辑删除：标记 Deleted 并 version + 1，记录保留
    async fn delete(&self, id: &str, expected_version: i64) -> Result<Order>;

    /// 过滤 + 分页查询，返回 (本页数据, 总数)
    async fn list(&self, filter: OrderFilter, page: Pagination) -> Result<(Vec<Order>, i64)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        let page = Pagination {
            page: 1,
            page_size: 20,
        };
        assert_eq!(page.offset(), 0);

        let page = Pagination {
            page: 3,
            page_size: 10,
        };
        assert_eq!(page.offset(), 20);

        // page 0 或负数按第 1 页处理
        let page = Pagination {
            page: 0,
            page_size: 10,
        };
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_default_pagination() {
        let page = Pagination::default();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 20);
    }
}
