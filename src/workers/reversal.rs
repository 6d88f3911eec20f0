//! Reversal Worker: fires a swapped-direction FTD against
//! transactions the Callback/FTC path marked `reversalRequired`, bounded by
//! `reversalAttempts < maxReversalAttempts`.

use tokio_util::sync::CancellationToken;

use crate::amount::format_amount;
use crate::error::Result;
use crate::gateway::build_reversal_request;
use crate::gateway::payload::is_inconclusive;
use crate::ids::mint_correlation_pair;
use crate::service::notify::enqueue_terminal_callback;
use crate::types::{event_sequence, AuditSeverity, ClientOutcome, GatewayEventType, Transaction, TransactionStatus};

use super::{poll_loop, WorkerContext};

pub async fn run(ctx: WorkerContext, cancel: CancellationToken) {
    let interval = std::time::Duration::from_secs(ctx.config.workers.reversal_sec);
    let batch_size = ctx.config.workers.batch_size;
    poll_loop("reversal", interval, cancel, || run_once(&ctx, batch_size)).await
}

pub async fn run_once(ctx: &WorkerContext, batch_size: i64) -> Result<usize> {
    let claimed = ctx.db.claim_due_reversals(ctx.config.reversal.max_attempts, batch_size).await?;
    let mut processed = 0;
    for tx in &claimed {
        if let Err(e) = process_one(ctx, tx).await {
            tracing::error!(transaction_id = %tx.id, error = %e, "reversal worker failed to process transaction");
        } else {
            processed += 1;
        }
    }
    Ok(processed)
}

async fn process_one(ctx: &WorkerContext, tx: &Transaction) -> Result<()> {
    let pair = mint_correlation_pair();

    let gw_req = build_reversal_request(
        &ctx.config.gateway,
        &pair.session_id,
        &pair.tracking_number,
        &tx.src_bank_code,
        &tx.src_account_number,
        &tx.src_account_name,
        &tx.dest_bank_code,
        &tx.dest_account_number,
        &tx.dest_account_name,
        &format_amount(tx.amount),
        &tx.narration,
        &ctx.config.advertised_callback_url,
    );
    let request_payload = serde_json::to_value(&gw_req)
        .map_err(|e| crate::Error::Internal(anyhow::anyhow!("reversal request serialization failed: {e}")))?;

    ctx.db
        .record_event_request(
            tx.id,
            GatewayEventType::ReversalRequest,
            event_sequence::REVERSAL_REQUEST,
            &pair.session_id,
            &pair.tracking_number,
            &ctx.config.gateway.ftd_function_code,
            &request_payload,
        )
        .await?;

    let updated = ctx
        .db
        .update_fields(tx.id, |t| {
            t.reversal_session_id = Some(pair.session_id.clone());
            t.reversal_tracking_number = Some(pair.tracking_number.clone());
            t.reversal_attempts += 1;
        })
        .await?;

    let response = ctx.gateway.reversal(gw_req).await?;
    ctx.db
        .record_event_response(
            updated.id,
            event_sequence::REVERSAL_REQUEST,
            &response.raw_response,
            response.action_code.as_deref(),
            response.status_code.as_deref(),
            response.duration_ms,
        )
        .await?;

    if crate::gateway::payload::is_success(response.action_code.as_deref()) || is_inconclusive(response.action_code.as_deref()) {
        // Await REVERSAL_CALLBACK or a scheduled TSQ; the leg stays
        // REVERSAL_PENDING either way.
        return Ok(());
    }

    // Definite failure. Escalate only once the attempt ceiling is reached —
    // otherwise the next poll retries with a fresh correlation pair.
    if updated.reversal_attempts < ctx.config.reversal.max_attempts {
        return Ok(());
    }

    let action_code = response.action_code.clone();
    let reversal_failed = ctx
        .db
        .apply_transition(updated.id, TransactionStatus::ReversalFailed, |t| {
            t.reversal_action_code = action_code.clone();
        })
        .await?;
    let failed = ctx
        .db
        .apply_transition(reversal_failed.id, TransactionStatus::Failed, |_| {})
        .await?;

    ctx.db
        .record_audit(
            Some(failed.id),
            AuditSeverity::Critical,
            "reversal exhausted all attempts without success: funds potentially stuck",
            Some(&response.raw_response),
        )
        .await?;

    enqueue_terminal_callback(
        &ctx.db,
        &ctx.config.client_callback,
        &failed,
        ClientOutcome::Failed,
        action_code.as_deref().unwrap_or("999"),
        "reversal failed, manual intervention required",
        true,
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::test_support::test_db;
    use crate::db::transactions::NewTransaction;
    use crate::gateway::test_support::{response, ScriptedGatewayClient};
    use crate::types::TransactionType;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn seed_reversal_pending(db: &crate::db::DatabaseManager, attempts: i32) -> Transaction {
        let id = Uuid::new_v4();
        let created = db
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
                timeout_at: Utc::now() + Duration::minutes(60),
            })
            .await
            .unwrap();
        let ftc_failed = db.apply_transition(created.id, TransactionStatus::FtdSuccess, |_| {}).await.unwrap();
        let ftc_failed = db
            .apply_transition(ftc_failed.id, TransactionStatus::FtcPending, |_| {})
            .await
            .unwrap();
        let ftc_failed = db.apply_transition(ftc_failed.id, TransactionStatus::FtcFailed, |_| {}).await.unwrap();
        db.apply_transition(ftc_failed.id, TransactionStatus::ReversalPending, |t| {
            t.reversal_required = true;
            t.reversal_attempts = attempts;
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn reversal_success_stays_pending_for_callback() {
        let Some(db) = test_db().await else { return };
        let tx = seed_reversal_pending(&db, 0).await;

        let mut fake = ScriptedGatewayClient::new();
        fake.push_reversal(response(Some("000"), Some("00")));
        let ctx = WorkerContext { db: db.clone(), gateway: Arc::new(fake), config: EngineConfig::default() };

        run_once(&ctx, 10).await.unwrap();

        let updated = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(updated.status, TransactionStatus::ReversalPending);
        assert_eq!(updated.reversal_attempts, 1);
    }

    #[tokio::test]
    async fn reversal_failure_on_final_attempt_escalates_to_failed() {
        let Some(db) = test_db().await else { return };
        let tx = seed_reversal_pending(&db, 2).await; // one attempt left (max 3)

        let mut fake = ScriptedGatewayClient::new();
        fake.push_reversal(response(Some("051"), Some("00")));
        let ctx = WorkerContext { db: db.clone(), gateway: Arc::new(fake), config: EngineConfig::default() };

        run_once(&ctx, 10).await.unwrap();

        let updated = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(updated.status, TransactionStatus::Failed);
    }
}
