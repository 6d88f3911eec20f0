//! Client Callback Dispatcher: drains the outgoing-callback
//! table, signs payloads, and delivers them to the institution webhook with
//! exponential-backoff retry.

use chrono::Utc;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::ClientCallbackConfig;
use crate::error::Result;
use crate::signing::sign_payload;
use crate::types::ClientCallback;

use super::{poll_loop, WorkerContext};

pub async fn run(ctx: WorkerContext, cancel: CancellationToken) {
    let interval = std::time::Duration::from_secs(ctx.config.workers.dispatcher_sec);
    let batch_size = ctx.config.workers.batch_size;
    let http = Client::builder()
        .timeout(ctx.config.client_callback.request_timeout())
        .build()
        .expect("reqwest client builds with a static timeout");
    poll_loop("dispatcher", interval, cancel, || run_once(&ctx, &http, batch_size)).await
}

pub async fn run_once(ctx: &WorkerContext, http: &Client, batch_size: i64) -> Result<usize> {
    let claimed = ctx.db.claim_due_client_callbacks(batch_size).await?;
    let mut processed = 0;
    for cb in &claimed {
        if let Err(e) = deliver_one(ctx, http, &ctx.config.client_callback, cb).await {
            tracing::error!(client_callback_id = %cb.id, error = %e, "dispatcher failed to process delivery");
        } else {
            processed += 1;
        }
    }
    Ok(processed)
}

async fn deliver_one(ctx: &WorkerContext, http: &Client, cfg: &ClientCallbackConfig, cb: &ClientCallback) -> Result<()> {
    let canonical = serde_json::to_string(&cb.payload)
        .map_err(|e| crate::Error::Internal(anyhow::anyhow!("client callback payload serialization failed: {e}")))?;
    let timestamp_ms = Utc::now().timestamp_millis();
    let signature = sign_payload(&cfg.signing_secret, timestamp_ms, &canonical);
    let reference = cb
        .payload
        .get("referenceNumber")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let send_result = http
        .post(&cb.target_url)
        .header("X-Webhook-Signature", signature)
        .header("X-Webhook-Timestamp", timestamp_ms.to_string())
        .header("X-Transaction-Reference", reference)
        .header("User-Agent", "FundManagement-Webhook/1.0")
        .header("Content-Type", "application/json")
        .body(canonical)
        .send()
        .await;

    match send_result {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_success() {
                ctx.db.mark_client_callback_delivered(cb.id, status.as_u16() as i32, &body).await?;
                // Stamping `client_callback_sent` is bookkeeping, not a
                // state-machine edge — `update_fields` skips the transition
                // check that `apply_transition` would otherwise apply.
                ctx.db
                    .update_fields(cb.transaction_id, |t| {
                        t.client_callback_sent = true;
                        t.client_callback_sent_at = Some(Utc::now());
                    })
                    .await?;
            } else {
                let next = Utc::now() + chrono::Duration::from_std(cfg.backoff_delay(cb.attempts)).unwrap_or_default();
                ctx.db
                    .mark_client_callback_retry_or_failed(
                        cb.id,
                        next,
                        &format!("HTTP {status}"),
                        Some(status.as_u16() as i32),
                    )
                    .await?;
            }
        }
        Err(e) => {
            let next = Utc::now() + chrono::Duration::from_std(cfg.backoff_delay(cb.attempts)).unwrap_or_default();
            ctx.db
                .mark_client_callback_retry_or_failed(cb.id, next, &e.to_string(), None)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::test_support::test_db;
    use crate::db::transactions::NewTransaction;
    use crate::gateway::test_support::ScriptedGatewayClient;
    use crate::types::{TransactionStatus, TransactionType};
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn backoff_grows_on_repeated_failure() {
        let Some(db) = test_db().await else { return };
        let id = Uuid::new_v4();
        let tx = db
            .create_transaction(NewTransaction {
                id,
                reference_number: format!("ref-{id}"),
                session_id: format!("SES-{id}"),
                tracking_number: format!("TRK-{id}"),
                transaction_type: TransactionType::Ft,
                institution_id: Uuid::new_v4(),
                credential_id: Uuid::new_v4(),
                src_bank_code: "300307".into(),
                src_account_number: "1111111111".into(),
                src_account_name: "Alice".into(),
                dest_bank_code: "300304".into(),
                dest_account_number: "2222222222".into(),
                dest_account_name: "Bob".into(),
                amount: rust_decimal::Decimal::new(100050, 2),
                narration: "payment".into(),
                callback_url: None,
                status: TransactionStatus::FtdPending,
                timeout_at: chrono::Utc::now() + chrono::Duration::minutes(60),
            })
            .await
            .unwrap();

        db.enqueue_client_callback(
            tx.id,
            "http://127.0.0.1:1/unreachable",
            &serde_json::json!({"referenceNumber": tx.reference_number}),
            5,
        )
        .await
        .unwrap();

        let ctx = WorkerContext {
            db: db.clone(),
            gateway: Arc::new(ScriptedGatewayClient::new()),
            config: EngineConfig::default(),
        };
        let http = Client::builder().timeout(std::time::Duration::from_secs(2)).build().unwrap();

        run_once(&ctx, &http, 10).await.unwrap();

        let remaining = db.claim_due_client_callbacks(10).await.unwrap();
        // Rescheduled well into the future (base_delay_sec=5 after one
        // attempt), so it should not come back as immediately due.
        assert!(remaining.iter().all(|c| c.transaction_id != tx.id));
    }
}
