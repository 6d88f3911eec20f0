//! Background workers. Each worker owns an
//! independent polling cadence and claims its rows with `SKIP LOCKED`; the
//! state store is the only thing they share. Every `run` loop is
//! structured identically: sleep-or-cancel, then process one batch.

pub mod callback_processor;
pub mod dispatcher;
pub mod ftc;
pub mod reversal;
pub mod timeout;
pub mod tsq;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::db::DatabaseManager;
use crate::gateway::GatewayClient;

/// Shared handle every worker loop needs: the store, the Gateway client,
/// and the resolved configuration. Cheap to clone — `DatabaseManager` wraps
/// a pool handle and `GatewayClient` is behind an `Arc`.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: DatabaseManager,
    pub gateway: Arc<dyn GatewayClient>,
    pub config: EngineConfig,
}

/// Runs `run_once` on `poll_interval`, stopping cleanly when `cancel` fires.
/// Shared by every worker's public `run` entry point so the cancellation
/// and batching contract is implemented exactly once.
pub(crate) async fn poll_loop<F, Fut>(
    name: &'static str,
    poll_interval: Duration,
    cancel: CancellationToken,
    mut run_once: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<usize>>,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(worker = name, "shutting down");
                break;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        match run_once().await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(worker = name, claimed = n, "processed batch"),
            Err(e) => tracing::error!(worker = name, error = %e, "worker iteration failed"),
        }
    }
}
