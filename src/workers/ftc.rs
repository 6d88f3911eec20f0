//! FTC Worker: promotes `FTD_SUCCESS` transactions into the
//! credit leg with a freshly minted correlation pair.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::gateway::payload::{is_inconclusive, is_success};
use crate::gateway::build_ftc_request;
use crate::ids::mint_correlation_pair;
use crate::amount::format_amount;
use crate::types::{event_sequence, GatewayEventType, Transaction, TransactionStatus};

use super::{poll_loop, WorkerContext};

pub async fn run(ctx: WorkerContext, cancel: CancellationToken) {
    let interval = std::time::Duration::from_secs(ctx.config.workers.ftc_sec);
    let batch_size = ctx.config.workers.batch_size;
    poll_loop("ftc", interval, cancel, || run_once(&ctx, batch_size)).await
}

pub async fn run_once(ctx: &WorkerContext, batch_size: i64) -> Result<usize> {
    let claimed = ctx.db.claim_ftd_success(batch_size).await?;
    let mut processed = 0;
    for tx in &claimed {
        if let Err(e) = process_one(ctx, tx).await {
            tracing::error!(transaction_id = %tx.id, error = %e, "FTC worker failed to process transaction");
        } else {
            processed += 1;
        }
    }
    Ok(processed)
}

async fn process_one(ctx: &WorkerContext, tx: &Transaction) -> Result<()> {
    let pair = mint_correlation_pair();

    let gw_req = build_ftc_request(
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
        .map_err(|e| crate::Error::Internal(anyhow::anyhow!("FTC request serialization failed: {e}")))?;

    ctx.db
        .record_event_request(
            tx.id,
            GatewayEventType::FtcRequest,
            event_sequence::FTC_REQUEST,
            &pair.session_id,
            &pair.tracking_number,
            &ctx.config.gateway.ftc_function_code,
            &request_payload,
        )
        .await?;

    let updated = ctx
        .db
        .apply_transition(tx.id, TransactionStatus::FtcPending, |t| {
            t.ftc_session_id = Some(pair.session_id.clone());
            t.ftc_tracking_number = Some(pair.tracking_number.clone());
        })
        .await?;

    let response = ctx.gateway.ftc(gw_req).await?;
    ctx.db
        .record_event_response(
            updated.id,
            event_sequence::FTC_REQUEST,
            &response.raw_response,
            response.action_code.as_deref(),
            response.status_code.as_deref(),
            response.duration_ms,
        )
        .await?;

    if is_success(response.action_code.as_deref()) || is_inconclusive(response.action_code.as_deref()) {
        // Await the FTC_CALLBACK (handled by the Callback Processor) or a
        // scheduled TSQ; nothing more to do here.
        return Ok(());
    }

    let action_code = response.action_code.clone();
    let failed = ctx
        .db
        .apply_transition(updated.id, TransactionStatus::FtcFailed, |t| {
            t.ftc_action_code = action_code.clone();
        })
        .await?;
    ctx.db
        .apply_transition(failed.id, TransactionStatus::ReversalPending, |t| {
            t.reversal_required = true;
        })
        .await?;

    Ok(())
}
