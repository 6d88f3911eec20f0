//! FundMovement Core process entry point. Loads
//! configuration, opens the State Store, and runs every background worker
//! concurrently until a shutdown signal arrives.

use std::sync::Arc;

use fundmovement_core::config::EngineConfig;
use fundmovement_core::db::DatabaseManager;
use fundmovement_core::gateway::{GatewayClient, HttpGatewayClient};
use fundmovement_core::workers::{callback_processor, dispatcher, ftc, reversal, timeout, tsq, WorkerContext};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let config = EngineConfig::from_env()?;
    tracing::info!("starting fundmovement-core");

    let db = DatabaseManager::new(&config.database_url).await?;
    let gateway: Arc<dyn GatewayClient> = Arc::new(HttpGatewayClient::new(config.gateway.clone())?);
    let ctx = WorkerContext { db, gateway, config };

    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    handles.push(tokio::spawn(callback_processor::run(ctx.clone(), cancel.clone())));
    handles.push(tokio::spawn(ftc::run(ctx.clone(), cancel.clone())));
    handles.push(tokio::spawn(reversal::run(ctx.clone(), cancel.clone())));
    handles.push(tokio::spawn(tsq::run(ctx.clone(), cancel.clone())));
    handles.push(tokio::spawn(timeout::run(ctx.clone(), cancel.clone())));
    handles.push(tokio::spawn(dispatcher::run(ctx.clone(), cancel.clone())));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, waiting for in-flight work to finish");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "worker task panicked during shutdown");
        }
    }

    tracing::info!("fundmovement-core stopped");
    Ok(())
}
