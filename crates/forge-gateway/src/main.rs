//! Forge gateway: the platform's HTTP entry point.
//!
//! Wires the cluster manager, delivery store, webhook engine, and request
//! processor together and serves the consumer API.

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use forge_agent_rpc::GrpcAgentConnector;
use forge_cluster::{ClusterConfig, KubeClusterManager};
use forge_gateway::{create_router, GatewayConfig, GatewayState};
use forge_processor::{ProcessorConfig, RequestProcessor};
use forge_store::PgDeliveryStore;
use forge_webhook::{WebhookEngine, WebhookEngineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,forge_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting Forge gateway");

    let gateway_config = GatewayConfig::from_env();
    let cluster_config = ClusterConfig::from_env();

    tracing::info!(
        port = gateway_config.port,
        namespace = %cluster_config.namespace,
        image = %cluster_config.image,
        "configuration loaded"
    );

    let cluster = Arc::new(KubeClusterManager::new(cluster_config).await?);
    tracing::info!("cluster manager connected");

    let store = Arc::new(PgDeliveryStore::connect(&gateway_config.database_url).await?);
    tracing::info!("delivery store connected");

    let connector = Arc::new(GrpcAgentConnector::new());
    let webhooks = Arc::new(WebhookEngine::new(
        Arc::clone(&store),
        WebhookEngineConfig::from_env(),
    )?);

    let processor = Arc::new(RequestProcessor::new(
        Arc::clone(&cluster),
        Arc::clone(&connector),
        webhooks,
        Arc::clone(&store),
        ProcessorConfig::from_env(),
    ));

    let shutdown_timeout = gateway_config.shutdown_timeout();
    let port = gateway_config.port;
    let state = GatewayState::new(processor, cluster, connector, gateway_config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining requests");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!("drain deadline exceeded, exiting"),
    }

    tracing::info!("gateway stopped");
    Ok(())
}
