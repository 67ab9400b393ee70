//! 数据库模型定义

pub mod order;

pub use order::OrderRow;
