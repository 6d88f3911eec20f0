//! Timeout Worker: nudges transactions whose `timeoutAt` has
//! elapsed while stuck in a non-terminal, non-reversal state.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::service::notify::enqueue_terminal_callback;
use crate::types::{ClientOutcome, Transaction, TransactionStatus, TsqType};

use super::{poll_loop, WorkerContext};

pub async fn run(ctx: WorkerContext, cancel: CancellationToken) {
    let interval = std::time::Duration::from_secs(ctx.config.workers.timeout_sec);
    let batch_size = ctx.config.workers.batch_size;
    poll_loop("timeout", interval, cancel, || run_once(&ctx, batch_size)).await
}

pub async fn run_once(ctx: &WorkerContext, batch_size: i64) -> Result<usize> {
    let claimed = ctx.db.claim_timed_out(batch_size).await?;
    let mut processed = 0;
    for tx in &claimed {
        if let Err(e) = process_one(ctx, tx).await {
            tracing::error!(transaction_id = %tx.id, error = %e, "timeout worker failed to process transaction");
        } else {
            processed += 1;
        }
    }
    Ok(processed)
}

async fn process_one(ctx: &WorkerContext, tx: &Transaction) -> Result<()> {
    match tx.status {
        TransactionStatus::Initiated | TransactionStatus::NecPending => {
            let timed_out = ctx.db.apply_transition(tx.id, TransactionStatus::Timeout, |_| {}).await?;
            enqueue_terminal_callback(
                &ctx.db,
                &ctx.config.client_callback,
                &timed_out,
                ClientOutcome::Timeout,
                "599",
                "no response from gateway before timeout",
                false,
            )
            .await?;
        }
        TransactionStatus::FtdPending => {
            let updated = ctx
                .db
                .apply_transition(tx.id, TransactionStatus::FtdTsq, |t| {
                    t.tsq_required = true;
                    t.tsq_next_attempt_at = Some(Utc::now());
                })
                .await?;
            ctx.db
                .schedule_tsq(
                    updated.id,
                    TsqType::Ftd,
                    &updated.session_id,
                    &updated.tracking_number,
                    Utc::now(),
                    ctx.config.tsq.max_attempts,
                )
                .await?;
        }
        TransactionStatus::FtdTsq => {
            // TSQ itself stalled past the overall FT timeout; give up on the
            // debit leg rather than wait indefinitely.
            let failed_leg = ctx.db.apply_transition(tx.id, TransactionStatus::FtdFailed, |_| {}).await?;
            let failed = ctx.db.apply_transition(failed_leg.id, TransactionStatus::Failed, |_| {}).await?;
            enqueue_terminal_callback(
                &ctx.db,
                &ctx.config.client_callback,
                &failed,
                ClientOutcome::Failed,
                "598",
                "debit leg status query did not resolve before timeout",
                false,
            )
            .await?;
        }
        TransactionStatus::FtcPending => {
            let target_session = tx.ftc_session_id.clone().unwrap_or_else(|| tx.session_id.clone());
            let target_tracking = tx.ftc_tracking_number.clone().unwrap_or_else(|| tx.tracking_number.clone());
            let updated = ctx
                .db
                .apply_transition(tx.id, TransactionStatus::FtcTsq, |t| {
                    t.tsq_required = true;
                    t.tsq_next_attempt_at = Some(Utc::now());
                })
                .await?;
            ctx.db
                .schedule_tsq(updated.id, TsqType::Ftc, &target_session, &target_tracking, Utc::now(), ctx.config.tsq.max_attempts)
                .await?;
        }
        TransactionStatus::FtcTsq => {
            ctx.db
                .apply_transition(tx.id, TransactionStatus::FtcFailed, |t| {
                    t.reversal_required = true;
                })
                .await?;
            ctx.db
                .apply_transition(tx.id, TransactionStatus::ReversalPending, |_| {})
                .await?;
        }
        _ => {}
    }
    Ok(())
}
