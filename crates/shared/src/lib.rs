//! 共享库
//!
//! 包含订单服务与投影服务共用的配置、错误处理、数据库连接、
//! Kafka、事件模型等基础设施代码。

pub mod config;
pub mod database;
pub mod dlq;
pub mod error;
pub mod events;
pub mod kafka;
pub mod observability;
pub mod retry;
