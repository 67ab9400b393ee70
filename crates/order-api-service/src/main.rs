//! 订单 API 服务
//!
//! 提供订单 CRUD 的 REST API，每次成功变更落库后派生事件
//! 并发布到 Kafka，供下游投影服务消费。

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use order_api_service::repository::PgOrderStore;
use order_api_service::routes::create_router;
use order_api_service::service::OrderService;
use order_api_service::state::AppState;
use order_shared::config::AppConfig;
use order_shared::database::Database;
use order_shared::kafka::KafkaProducer;
use order_shared::observability;
use order_shared::retry::RetryPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：default.toml → {env}.toml → {service}.toml → 环境变量
    let config = AppConfig::load("order-api-service").unwrap_or_default();

    observability::init(&config.observability)?;

    info!("Starting order-api-service on {}", config.server_addr());

    // 初始化基础设施
    let db = Database::connect(&config.database).await?;
    let producer = KafkaProducer::new(&config.kafka)?;

    let store = Arc::new(PgOrderStore::new(db.pool().clone()));
    let order_service = Arc::new(OrderService::new(
        store,
        Arc::new(producer),
        RetryPolicy::from(&config.publish),
    ));

    let state = AppState::new(order_service, db.clone());
    let app = create_router(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM（K8s 停止 Pod）或 Ctrl+C 时，
    // 停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
/// 收到任一信号后返回，触发 axum 的优雅关闭流程。
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
