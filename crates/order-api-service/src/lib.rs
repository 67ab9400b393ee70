//! 订单服务（HTTP 边界 + 变更编排）
//!
//! 提供订单 CRUD 的 REST API，每次变更先落库再派生事件发布到 Kafka。
//! 发布失败不回滚存储，以 PartialSuccess 显式上报。

pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{ApiError, Result};
