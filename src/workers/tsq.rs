//! TSQ Worker: reconciles legs the Gateway left ambiguous by
//! polling the TSQ decision table until a definite outcome or the attempt
//! ceiling forces one.

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::gateway::build_tsq_request;
use crate::service::notify::enqueue_terminal_callback;
use crate::tsq_decision::{classify, TsqDecision};
use crate::types::{
    event_sequence, AuditSeverity, ClientOutcome, GatewayEventType, Transaction, TransactionStatus, TsqTask, TsqType,
};

use super::{poll_loop, WorkerContext};

pub async fn run(ctx: WorkerContext, cancel: CancellationToken) {
    let interval = std::time::Duration::from_secs(ctx.config.workers.tsq_sec);
    let batch_size = ctx.config.workers.batch_size;
    // Warm-up delay before the first poll, giving the Gateway time to
    // settle the legs that just triggered TSQ scheduling.
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(std::time::Duration::from_secs(ctx.config.workers.tsq_warmup_sec)) => {}
    }
    poll_loop("tsq", interval, cancel, || run_once(&ctx, batch_size)).await
}

pub async fn run_once(ctx: &WorkerContext, batch_size: i64) -> Result<usize> {
    let claimed = ctx.db.claim_due_tsq(batch_size).await?;
    let mut processed = 0;
    for task in &claimed {
        if let Err(e) = process_one(ctx, task).await {
            tracing::error!(tsq_task_id = %task.id, error = %e, "TSQ worker failed to process task");
        } else {
            processed += 1;
        }
    }
    Ok(processed)
}

async fn process_one(ctx: &WorkerContext, task: &TsqTask) -> Result<()> {
    let Some(tx) = ctx.db.get_transaction(task.transaction_id).await? else {
        ctx.db.complete_tsq(task.id).await?;
        return Ok(());
    };

    if tx.status.is_terminal() {
        ctx.db.complete_tsq(task.id).await?;
        return Ok(());
    }

    let gw_req = build_tsq_request(&ctx.config.gateway, &task.target_session_id, &task.target_tracking_number);
    let event_type = match task.tsq_type {
        TsqType::Ftd => GatewayEventType::FtdTsqResponse,
        TsqType::Ftc => GatewayEventType::FtcTsqResponse,
        TsqType::Reversal => GatewayEventType::ReversalTsqResponse,
    };
    let seq = event_sequence::TSQ_BASE + task.attempts;
    let request_payload = serde_json::to_value(&gw_req)
        .map_err(|e| crate::Error::Internal(anyhow::anyhow!("TSQ request serialization failed: {e}")))?;

    ctx.db
        .record_event_request(
            tx.id,
            event_type,
            seq,
            &task.target_session_id,
            &task.target_tracking_number,
            &ctx.config.gateway.tsq_function_code,
            &request_payload,
        )
        .await?;

    let response = ctx.gateway.tsq(gw_req).await?;
    ctx.db
        .record_event_response(
            tx.id,
            seq,
            &response.raw_response,
            response.action_code.as_deref(),
            response.status_code.as_deref(),
            response.duration_ms,
        )
        .await?;

    let decision = classify(response.action_code.as_deref(), response.status_code.as_deref());
    let attempts_after = task.attempts + 1;
    let at_ceiling = attempts_after >= task.max_attempts;

    if decision == TsqDecision::RetryLater && !at_ceiling {
        let next = Utc::now() + Duration::minutes(ctx.config.tsq.interval_min);
        ctx.db.reschedule_tsq(task.id, next).await?;
        return Ok(());
    }

    // Either a definite decision, or still inconclusive at the attempt
    // ceiling — force a terminal outcome rather than requeuing forever,
    // treating that case the same as an explicit FAIL.
    let forced = if decision == TsqDecision::RetryLater { TsqDecision::Fail } else { decision };

    ctx.db.complete_tsq(task.id).await?;
    apply_decision(ctx, &tx, task.tsq_type, forced, response.action_code.clone()).await
}

async fn apply_decision(
    ctx: &WorkerContext,
    tx: &Transaction,
    tsq_type: TsqType,
    decision: TsqDecision,
    action_code: Option<String>,
) -> Result<()> {
    match (tsq_type, decision) {
        (TsqType::Ftd, TsqDecision::Success) => {
            ctx.db
                .apply_transition(tx.id, TransactionStatus::FtdSuccess, |t| {
                    t.ftd_action_code = action_code;
                })
                .await?;
        }
        (TsqType::Ftd, TsqDecision::Fail | TsqDecision::Manual) => {
            let failed_leg = ctx
                .db
                .apply_transition(tx.id, TransactionStatus::FtdFailed, |t| {
                    t.ftd_action_code = action_code.clone();
                })
                .await?;
            let failed = ctx.db.apply_transition(failed_leg.id, TransactionStatus::Failed, |_| {}).await?;
            if decision == TsqDecision::Manual {
                ctx.db
                    .record_audit(
                        Some(failed.id),
                        AuditSeverity::Critical,
                        "FTD TSQ returned a mismatched/stale result requiring operator review",
                        None,
                    )
                    .await?;
            }
            enqueue_terminal_callback(
                &ctx.db,
                &ctx.config.client_callback,
                &failed,
                ClientOutcome::Failed,
                action_code.as_deref().unwrap_or("999"),
                "debit leg could not be confirmed",
                decision == TsqDecision::Manual,
            )
            .await?;
        }
        (TsqType::Ftc, TsqDecision::Success) => {
            let success = ctx
                .db
                .apply_transition(tx.id, TransactionStatus::FtcSuccess, |t| {
                    t.ftc_action_code = action_code;
                })
                .await?;
            let completed = ctx.db.apply_transition(success.id, TransactionStatus::Completed, |_| {}).await?;
            enqueue_terminal_callback(
                &ctx.db,
                &ctx.config.client_callback,
                &completed,
                ClientOutcome::Successful,
                "000",
                "transfer completed",
                false,
            )
            .await?;
        }
        (TsqType::Ftc, TsqDecision::Fail | TsqDecision::Manual) => {
            // Safer to reverse than leak funds once the debit leg already
            // succeeded.
            ctx.db
                .apply_transition(tx.id, TransactionStatus::FtcFailed, |t| {
                    t.ftc_action_code = action_code;
                })
                .await?;
            ctx.db
                .apply_transition(tx.id, TransactionStatus::ReversalPending, |t| {
                    t.reversal_required = true;
                })
                .await?;
        }
        (TsqType::Reversal, TsqDecision::Success) => {
            let success = ctx
                .db
                .apply_transition(tx.id, TransactionStatus::ReversalSuccess, |t| {
                    t.reversal_action_code = action_code.clone();
                })
                .await?;
            let failed = ctx.db.apply_transition(success.id, TransactionStatus::Failed, |_| {}).await?;
            enqueue_terminal_callback(
                &ctx.db,
                &ctx.config.client_callback,
                &failed,
                ClientOutcome::Failed,
                action_code.as_deref().unwrap_or("000"),
                "transfer failed and was reversed",
                false,
            )
            .await?;
        }
        (TsqType::Reversal, TsqDecision::Fail | TsqDecision::Manual) => {
            let reversal_failed = ctx
                .db
                .apply_transition(tx.id, TransactionStatus::ReversalFailed, |t| {
                    t.reversal_action_code = action_code.clone();
                })
                .await?;
            let failed = ctx.db.apply_transition(reversal_failed.id, TransactionStatus::Failed, |_| {}).await?;
            ctx.db
                .record_audit(
                    Some(failed.id),
                    AuditSeverity::Critical,
                    "reversal could not be confirmed via TSQ: funds potentially stuck",
                    None,
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
        }
        (_, TsqDecision::RetryLater) => unreachable!("RetryLater is coerced to Fail before reaching apply_decision"),
    }
    Ok(())
}
