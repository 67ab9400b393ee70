//! 订单投影服务
//!
//! 消费 Kafka 订单事件，维护订单投影表。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use order_projection_service::consumer::OrderEventConsumer;
use order_projection_service::projector::PgProjector;
use order_shared::config::AppConfig;
use order_shared::database::Database;
use order_shared::dlq::DlqProducer;
use order_shared::kafka::KafkaProducer;
use order_shared::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("order-projection-service").unwrap_or_default();

    observability::init(&config.observability)?;

    info!("Starting order-projection-service...");

    let db = Database::connect(&config.database).await?;

    // 死信走独立生产者，与消费位于同一 broker 集群
    let producer = KafkaProducer::new(&config.kafka)?;
    let dlq = Arc::new(DlqProducer::new(producer, &config.service_name));

    let projector = Arc::new(PgProjector::new(db.pool().clone()));
    let consumer = OrderEventConsumer::new(&config, projector, dlq)?;

    // watch channel 承载关闭信号：收到 SIGTERM/Ctrl+C 后置 true，
    // 消费循环在当前消息处理完毕后退出
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;

    db.close().await;
    info!("order-projection-service shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
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
