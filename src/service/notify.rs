//! Shared helper for enqueueing the single terminal client-webhook
//! notification a transaction is owed. Every
//! worker that lands a transaction in a terminal-ish state calls this
//! instead of touching `client_callbacks` directly, so the
//! `clientCallbackSent`-guarded idempotency rule lives in one place.

use crate::config::ClientCallbackConfig;
use crate::db::DatabaseManager;
use crate::error::Result;
use crate::types::{ClientOutcome, Transaction};
use crate::webhook::build_payload;

/// Builds and enqueues the terminal notification for `tx`. Skips silently
/// if one was already sent — `client_callback_sent` is the idempotency
/// guard.
pub async fn enqueue_terminal_callback(
    db: &DatabaseManager,
    cfg: &ClientCallbackConfig,
    tx: &Transaction,
    outcome: ClientOutcome,
    response_code: &str,
    response_message: &str,
    requires_manual_intervention: bool,
) -> Result<()> {
    if tx.client_callback_sent {
        return Ok(());
    }

    let payload = build_payload(tx, outcome, response_code, response_message, requires_manual_intervention);
    let payload_json = serde_json::to_value(&payload)
        .map_err(|e| crate::Error::Internal(anyhow::anyhow!("webhook payload serialization failed: {e}")))?;

    let target_url = tx
        .callback_url
        .clone()
        .unwrap_or_else(|| "https://institution-webhook.invalid/fallback".to_string());

    db.enqueue_client_callback(tx.id, &target_url, &payload_json, cfg.max_attempts)
        .await?;

    tracing::info!(
        transaction_id = %tx.id,
        reference = %tx.reference_number,
        outcome = outcome.as_str(),
        "enqueued terminal client callback"
    );
    Ok(())
}
