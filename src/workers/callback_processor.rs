//! Callback Processor Worker: consumes persisted Gateway
//! callbacks, correlates them to a transaction by session id, and applies
//! the FTD/FTC/Reversal decision rules.

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::gateway::payload::{is_inconclusive, is_success};
use crate::service::notify::enqueue_terminal_callback;
use crate::types::{
    event_sequence, AuditSeverity, ClientOutcome, GatewayCallback, GatewayCallbackStatus, GatewayEventType,
    Transaction, TransactionStatus, TsqType,
};

use super::{poll_loop, WorkerContext};

pub async fn run(ctx: WorkerContext, cancel: CancellationToken) {
    let interval = std::time::Duration::from_secs(ctx.config.workers.callback_processor_sec);
    let batch_size = ctx.config.workers.batch_size;
    poll_loop("callback_processor", interval, cancel, || run_once(&ctx, batch_size)).await
}

pub async fn run_once(ctx: &WorkerContext, batch_size: i64) -> Result<usize> {
    let callbacks = ctx.db.claim_pending_callbacks(batch_size).await?;
    let mut processed = 0;
    for cb in &callbacks {
        let outcome = process_one(ctx, cb).await.unwrap_or_else(|e| {
            tracing::error!(callback_id = %cb.id, error = %e, "failed to process gateway callback");
            GatewayCallbackStatus::Error
        });
        ctx.db.mark_callback(cb.id, outcome).await?;
        processed += 1;
    }
    Ok(processed)
}

enum Leg {
    Ftd,
    Ftc,
    Reversal,
}

async fn process_one(ctx: &WorkerContext, cb: &GatewayCallback) -> Result<GatewayCallbackStatus> {
    let Some(tx) = ctx.db.get_transaction_by_any_session(&cb.session_id).await? else {
        ctx.db
            .record_audit(
                None,
                AuditSeverity::Warning,
                &format!("gateway callback for unknown session {}", cb.session_id),
                Some(&cb.raw_payload),
            )
            .await?;
        return Ok(GatewayCallbackStatus::Ignored);
    };

    if tx.status.is_terminal() {
        // At-least-once Gateway delivery; the leg already settled (invariant
        // 7: no worker mutates a terminal transaction again).
        return Ok(GatewayCallbackStatus::Ignored);
    }

    let leg = if cb.session_id == tx.session_id {
        Leg::Ftd
    } else if tx.ftc_session_id.as_deref() == Some(cb.session_id.as_str()) {
        Leg::Ftc
    } else if tx.reversal_session_id.as_deref() == Some(cb.session_id.as_str()) {
        Leg::Reversal
    } else {
        return Ok(GatewayCallbackStatus::Ignored);
    };

    match leg {
        Leg::Ftd => handle_ftd_callback(ctx, &tx, cb).await,
        Leg::Ftc => handle_ftc_callback(ctx, &tx, cb).await,
        Leg::Reversal => handle_reversal_callback(ctx, &tx, cb).await,
    }
}

async fn record_callback_event(
    ctx: &WorkerContext,
    tx: &Transaction,
    event_type: GatewayEventType,
    event_sequence: i32,
    cb: &GatewayCallback,
) -> Result<()> {
    ctx.db
        .record_event_request(
            tx.id,
            event_type,
            event_sequence,
            &cb.session_id,
            &tx.tracking_number,
            cb.function_code.as_deref().unwrap_or(""),
            &cb.raw_payload,
        )
        .await?;
    ctx.db
        .record_event_response(
            tx.id,
            event_sequence,
            &cb.raw_payload,
            cb.action_code.as_deref(),
            cb.status_code.as_deref(),
            0,
        )
        .await?;
    Ok(())
}

async fn handle_ftd_callback(ctx: &WorkerContext, tx: &Transaction, cb: &GatewayCallback) -> Result<GatewayCallbackStatus> {
    if !matches!(tx.status, TransactionStatus::FtdPending | TransactionStatus::FtdTsq) {
        return Ok(GatewayCallbackStatus::Ignored);
    }

    record_callback_event(ctx, tx, GatewayEventType::FtdCallback, event_sequence::FTD_CALLBACK, cb).await?;

    if is_success(cb.action_code.as_deref()) {
        ctx.db
            .apply_transition(tx.id, TransactionStatus::FtdSuccess, |t| {
                t.ftd_action_code = cb.action_code.clone();
            })
            .await?;
    } else if is_inconclusive(cb.action_code.as_deref()) {
        if tx.status != TransactionStatus::FtdTsq {
            let scheduled_for = Utc::now() + Duration::minutes(ctx.config.tsq.interval_min);
            ctx.db
                .apply_transition(tx.id, TransactionStatus::FtdTsq, |t| {
                    t.tsq_required = true;
                    t.tsq_next_attempt_at = Some(scheduled_for);
                })
                .await?;
            ctx.db
                .schedule_tsq(
                    tx.id,
                    TsqType::Ftd,
                    &tx.session_id,
                    &tx.tracking_number,
                    scheduled_for,
                    ctx.config.tsq.max_attempts,
                )
                .await?;
        }
    } else {
        let updated = ctx
            .db
            .apply_transition(tx.id, TransactionStatus::FtdFailed, |t| {
                t.ftd_action_code = cb.action_code.clone();
            })
            .await?;
        let failed = ctx.db.apply_transition(updated.id, TransactionStatus::Failed, |_| {}).await?;
        enqueue_terminal_callback(
            &ctx.db,
            &ctx.config.client_callback,
            &failed,
            ClientOutcome::Failed,
            cb.action_code.as_deref().unwrap_or("999"),
            "debit leg rejected by gateway",
            false,
        )
        .await?;
    }

    Ok(GatewayCallbackStatus::Processed)
}

async fn handle_ftc_callback(ctx: &WorkerContext, tx: &Transaction, cb: &GatewayCallback) -> Result<GatewayCallbackStatus> {
    if !matches!(tx.status, TransactionStatus::FtcPending | TransactionStatus::FtcTsq) {
        return Ok(GatewayCallbackStatus::Ignored);
    }

    record_callback_event(ctx, tx, GatewayEventType::FtcCallback, event_sequence::FTC_CALLBACK, cb).await?;

    if is_success(cb.action_code.as_deref()) {
        let updated = ctx
            .db
            .apply_transition(tx.id, TransactionStatus::FtcSuccess, |t| {
                t.ftc_action_code = cb.action_code.clone();
            })
            .await?;
        let completed = ctx.db.apply_transition(updated.id, TransactionStatus::Completed, |_| {}).await?;
        enqueue_terminal_callback(
            &ctx.db,
            &ctx.config.client_callback,
            &completed,
            ClientOutcome::Successful,
            cb.action_code.as_deref().unwrap_or("000"),
            "transfer completed",
            false,
        )
        .await?;
    } else if is_inconclusive(cb.action_code.as_deref()) {
        if tx.status != TransactionStatus::FtcTsq {
            let scheduled_for = Utc::now() + Duration::minutes(ctx.config.tsq.interval_min);
            ctx.db
                .apply_transition(tx.id, TransactionStatus::FtcTsq, |t| {
                    t.tsq_required = true;
                    t.tsq_next_attempt_at = Some(scheduled_for);
                })
                .await?;
            ctx.db
                .schedule_tsq(
                    tx.id,
                    TsqType::Ftc,
                    tx.ftc_session_id.as_deref().unwrap_or(&tx.session_id),
                    tx.ftc_tracking_number.as_deref().unwrap_or(&tx.tracking_number),
                    scheduled_for,
                    ctx.config.tsq.max_attempts,
                )
                .await?;
        }
    } else {
        // Credit leg failed after the debit succeeded: reverse rather than
        // notify.
        let updated = ctx
            .db
            .apply_transition(tx.id, TransactionStatus::FtcFailed, |t| {
                t.ftc_action_code = cb.action_code.clone();
            })
            .await?;
        ctx.db
            .apply_transition(updated.id, TransactionStatus::ReversalPending, |t| {
                t.reversal_required = true;
            })
            .await?;
    }

    Ok(GatewayCallbackStatus::Processed)
}

async fn handle_reversal_callback(
    ctx: &WorkerContext,
    tx: &Transaction,
    cb: &GatewayCallback,
) -> Result<GatewayCallbackStatus> {
    if tx.status != TransactionStatus::ReversalPending {
        return Ok(GatewayCallbackStatus::Ignored);
    }

    record_callback_event(ctx, tx, GatewayEventType::ReversalCallback, event_sequence::REVERSAL_CALLBACK, cb).await?;

    if is_success(cb.action_code.as_deref()) {
        let updated = ctx
            .db
            .apply_transition(tx.id, TransactionStatus::ReversalSuccess, |t| {
                t.reversal_action_code = cb.action_code.clone();
            })
            .await?;
        let failed = ctx.db.apply_transition(updated.id, TransactionStatus::Failed, |_| {}).await?;
        enqueue_terminal_callback(
            &ctx.db,
            &ctx.config.client_callback,
            &failed,
            ClientOutcome::Failed,
            cb.action_code.as_deref().unwrap_or("000"),
            "transfer failed and was reversed",
            false,
        )
        .await?;
    } else if is_inconclusive(cb.action_code.as_deref()) {
        // No REVERSAL_TSQ state exists; stay in REVERSAL_PENDING
        // and let a scheduled TSQ resolve it.
        let scheduled_for = Utc::now() + Duration::minutes(ctx.config.tsq.interval_min);
        ctx.db
            .update_fields(tx.id, |t| {
                t.tsq_required = true;
                t.tsq_next_attempt_at = Some(scheduled_for);
            })
            .await?;
        ctx.db
            .schedule_tsq(
                tx.id,
                TsqType::Reversal,
                tx.reversal_session_id.as_deref().unwrap_or(&tx.session_id),
                tx.reversal_tracking_number.as_deref().unwrap_or(&tx.tracking_number),
                scheduled_for,
                ctx.config.tsq.max_attempts,
            )
            .await?;
    } else {
        let updated = ctx
            .db
            .apply_transition(tx.id, TransactionStatus::ReversalFailed, |t| {
                t.reversal_action_code = cb.action_code.clone();
            })
            .await?;
        let failed = ctx.db.apply_transition(updated.id, TransactionStatus::Failed, |_| {}).await?;
        ctx.db
            .record_audit(
                Some(failed.id),
                AuditSeverity::Critical,
                "reversal failed after failed credit leg: funds potentially stuck",
                Some(&cb.raw_payload),
            )
            .await?;
        enqueue_terminal_callback(
            &ctx.db,
            &ctx.config.client_callback,
            &failed,
            ClientOutcome::Failed,
            cb.action_code.as_deref().unwrap_or("999"),
            "reversal failed, manual intervention required",
            true,
        )
        .await?;
    }

    Ok(GatewayCallbackStatus::Processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::test_support::test_db;
    use crate::db::transactions::NewTransaction;
    use crate::gateway::test_support::ScriptedGatewayClient;
    use crate::types::TransactionType;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn seed_ftd_pending(ctx: &WorkerContext) -> Transaction {
        let id = Uuid::new_v4();
        let session_id = format!("SES-{id}");
        ctx.db
            .create_transaction(NewTransaction {
                id,
                reference_number: format!("ref-{id}"),
                session_id: session_id.clone(),
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
                callback_url: Some("https://institution.example/webhook".into()),
                status: TransactionStatus::FtdPending,
                timeout_at: Utc::now() + Duration::minutes(60),
            })
            .await
            .unwrap()
    }

    fn context(db: crate::db::DatabaseManager) -> WorkerContext {
        WorkerContext {
            db,
            gateway: Arc::new(ScriptedGatewayClient::new()),
            config: EngineConfig::default(),
        }
    }

    #[tokio::test]
    async fn ftd_success_callback_advances_to_ftd_success() {
        let Some(db) = test_db().await else { return };
        let ctx = context(db.clone());
        let tx = seed_ftd_pending(&ctx).await;

        db.insert_gateway_callback(&tx.session_id, Some("241"), Some("000"), Some("00"), &serde_json::json!({}), None)
            .await
            .unwrap();

        run_once(&ctx, 10).await.unwrap();

        let updated = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(updated.status, TransactionStatus::FtdSuccess);
    }

    #[tokio::test]
    async fn ftd_inconclusive_callback_schedules_tsq() {
        let Some(db) = test_db().await else { return };
        let ctx = context(db.clone());
        let tx = seed_ftd_pending(&ctx).await;

        db.insert_gateway_callback(&tx.session_id, Some("241"), Some("909"), None, &serde_json::json!({}), None)
            .await
            .unwrap();

        run_once(&ctx, 10).await.unwrap();

        let updated = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(updated.status, TransactionStatus::FtdTsq);
        assert!(updated.tsq_next_attempt_at.is_some());

        let due = db.claim_due_tsq(10).await.unwrap();
        assert!(due.iter().any(|t| t.transaction_id == tx.id));
    }

    #[tokio::test]
    async fn callback_for_unknown_session_is_ignored() {
        let Some(db) = test_db().await else { return };
        let ctx = context(db.clone());
        db.insert_gateway_callback("SES-nobody-owns-this", Some("241"), Some("000"), None, &serde_json::json!({}), None)
            .await
            .unwrap();

        run_once(&ctx, 10).await.unwrap();

        let remaining = db.claim_pending_callbacks(10).await.unwrap();
        assert!(remaining.iter().all(|c| c.session_id != "SES-nobody-owns-this"));
    }
}
