//! 订单存储层
//!
//! `OrderStore` trait 定义存储契约，`PgOrderStore` 是 PostgreSQL 实现。
//! 所有变更操作基于版本号做乐观并发控制，不使用行锁。

pub mod order_repo;
pub mod traits;

pub use order_repo::PgOrderStore;
pub use traits::{OrderDraft, OrderFilter, OrderPatch, OrderStore, Pagination};
