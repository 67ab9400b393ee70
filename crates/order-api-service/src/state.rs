//! 应用状态

use std::sync::Arc;

use order_shared::database::Database;

use crate::service::OrderService;

/// 所有 handler 共享的应用状态
#[derive(Clone)]
pub struct AppState {
    pub order_service: Arc<OrderService>,
    pub db: Database,
}

impl AppState {
    pub fn new(order_service: Arc<OrderService>, db: Database) -> Self {
        Self { order_service, db }
    }
}
