//! 订单投影服务（消费端）
//!
//! 消费订单事件流，把每条事件幂等地应用到本地投影表。
//! 位点只在应用成功后提交，同一订单的事件严格按版本号因果序应用，
//! 反复失败的事件进入死信队列放行分区。

pub mod consumer;
pub mod error;
pub mod projector;

pub use error::{ProjectionError, Result};
