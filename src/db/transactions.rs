//! Transaction row access: creation, lookup, and locked state transitions.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::DatabaseManager;
use crate::error::{Error, Result};
use crate::state_machine::validate_transition;
use crate::types::{AuditSeverity, Transaction, TransactionStatus, TransactionType};

/// Fields required to create a new transaction row. Timeouts, status, and
/// the correlation pair are computed by the caller (the Submission API)
/// before insertion.
pub struct NewTransaction {
    pub id: Uuid,
    pub reference_number: String,
    pub session_id: String,
    pub tracking_number: String,
    pub transaction_type: TransactionType,
    pub institution_id: Uuid,
    pub credential_id: Uuid,
    pub src_bank_code: String,
    pub src_account_number: String,
    pub src_account_name: String,
    pub dest_bank_code: String,
    pub dest_account_number: String,
    pub dest_account_name: String,
    pub amount: rust_decimal::Decimal,
    pub narration: String,
    pub callback_url: Option<String>,
    pub status: TransactionStatus,
    pub timeout_at: DateTime<Utc>,
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
    let transaction_type = TransactionType::from_str(row.try_get::<String, _>("transaction_type")?.as_str())
        .ok_or_else(|| Error::Internal(anyhow::anyhow!("unknown transaction_type in row")))?;
    let status = TransactionStatus::from_str(row.try_get::<String, _>("status")?.as_str())
        .ok_or_else(|| Error::Internal(anyhow::anyhow!("unknown status in row")))?;

    Ok(Transaction {
        id: row.try_get("id")?,
        reference_number: row.try_get("reference_number")?,
        session_id: row.try_get("session_id")?,
        tracking_number: row.try_get("tracking_number")?,
        transaction_type,
        institution_id: row.try_get("institution_id")?,
        credential_id: row.try_get("credential_id")?,
        src_bank_code: row.try_get("src_bank_code")?,
        src_account_number: row.try_get("src_account_number")?,
        src_account_name: row.try_get("src_account_name")?,
        dest_bank_code: row.try_get("dest_bank_code")?,
        dest_account_number: row.try_get("dest_account_number")?,
        dest_account_name: row.try_get("dest_account_name")?,
        amount: row.try_get("amount")?,
        narration: row.try_get("narration")?,
        callback_url: row.try_get("callback_url")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
        timeout_at: row.try_get("timeout_at")?,
        nec_action_code: row.try_get("nec_action_code")?,
        ftd_action_code: row.try_get("ftd_action_code")?,
        ftc_action_code: row.try_get("ftc_action_code")?,
        reversal_action_code: row.try_get("reversal_action_code")?,
        ftc_session_id: row.try_get("ftc_session_id")?,
        ftc_tracking_number: row.try_get("ftc_tracking_number")?,
        reversal_session_id: row.try_get("reversal_session_id")?,
        reversal_tracking_number: row.try_get("reversal_tracking_number")?,
        tsq_required: row.try_get("tsq_required")?,
        tsq_next_attempt_at: row.try_get("tsq_next_attempt_at")?,
        tsq_attempts: row.try_get("tsq_attempts")?,
        reversal_required: row.try_get("reversal_required")?,
        reversal_attempts: row.try_get("reversal_attempts")?,
        client_callback_sent: row.try_get("client_callback_sent")?,
        client_callback_sent_at: row.try_get("client_callback_sent_at")?,
        payee_name: row.try_get("payee_name")?,
    })
}

const SELECT_COLUMNS: &str = "id, reference_number, session_id, tracking_number, transaction_type, \
    institution_id, credential_id, src_bank_code, src_account_number, src_account_name, \
    dest_bank_code, dest_account_number, dest_account_name, amount, narration, callback_url, \
    status, created_at, updated_at, completed_at, timeout_at, nec_action_code, ftd_action_code, \
    ftc_action_code, reversal_action_code, ftc_session_id, ftc_tracking_number, \
    reversal_session_id, reversal_tracking_number, tsq_required, tsq_next_attempt_at, \
    tsq_attempts, reversal_required, reversal_attempts, client_callback_sent, \
    client_callback_sent_at, payee_name";

async fn lock_row(db_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, id: Uuid) -> Result<Transaction> {
    let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut **db_tx)
        .await?
        .ok_or_else(|| Error::TransactionNotFound(id.to_string()))?;
    row_to_transaction(&row)
}

async fn persist(db_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, updated: &Transaction) -> Result<()> {
    sqlx::query(
        "UPDATE transactions SET \
            status = $2, updated_at = $3, completed_at = $4, \
            nec_action_code = $5, ftd_action_code = $6, ftc_action_code = $7, reversal_action_code = $8, \
            ftc_session_id = $9, ftc_tracking_number = $10, reversal_session_id = $11, reversal_tracking_number = $12, \
            tsq_required = $13, tsq_next_attempt_at = $14, tsq_attempts = $15, \
            reversal_required = $16, reversal_attempts = $17, \
            client_callback_sent = $18, client_callback_sent_at = $19, payee_name = $20 \
         WHERE id = $1",
    )
    .bind(updated.id)
    .bind(updated.status.as_str())
    .bind(updated.updated_at)
    .bind(updated.completed_at)
    .bind(&updated.nec_action_code)
    .bind(&updated.ftd_action_code)
    .bind(&updated.ftc_action_code)
    .bind(&updated.reversal_action_code)
    .bind(&updated.ftc_session_id)
    .bind(&updated.ftc_tracking_number)
    .bind(&updated.reversal_session_id)
    .bind(&updated.reversal_tracking_number)
    .bind(updated.tsq_required)
    .bind(updated.tsq_next_attempt_at)
    .bind(updated.tsq_attempts)
    .bind(updated.reversal_required)
    .bind(updated.reversal_attempts)
    .bind(updated.client_callback_sent)
    .bind(updated.client_callback_sent_at)
    .bind(&updated.payee_name)
    .execute(&mut **db_tx)
    .await?;
    Ok(())
}

impl DatabaseManager {
    pub async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction> {
        let now = Utc::now();

        // Duplicate reference is rejected at submission, scoped per
        // institution.
        if self
            .get_transaction_by_reference(new.institution_id, &new.reference_number)
            .await?
            .is_some()
        {
            return Err(Error::DuplicateReference(new.reference_number));
        }

        sqlx::query(&format!(
            "INSERT INTO transactions ({SELECT_COLUMNS}) VALUES \
             ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31,$32,$33,$34,$35,$36,$37)"
        ))
        .bind(new.id)
        .bind(&new.reference_number)
        .bind(&new.session_id)
        .bind(&new.tracking_number)
        .bind(new.transaction_type.as_str())
        .bind(new.institution_id)
        .bind(new.credential_id)
        .bind(&new.src_bank_code)
        .bind(&new.src_account_number)
        .bind(&new.src_account_name)
        .bind(&new.dest_bank_code)
        .bind(&new.dest_account_number)
        .bind(&new.dest_account_name)
        .bind(new.amount)
        .bind(&new.narration)
        .bind(&new.callback_url)
        .bind(new.status.as_str())
        .bind(now)
        .bind(now)
        .bind(None::<DateTime<Utc>>)
        .bind(new.timeout_at)
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(false)
        .bind(None::<DateTime<Utc>>)
        .bind(0i32)
        .bind(false)
        .bind(0i32)
        .bind(false)
        .bind(None::<DateTime<Utc>>)
        .bind(None::<String>)
        .execute(self.pool())
        .await?;

        self.get_transaction(new.id)
            .await?
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("transaction vanished right after insert")))
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    pub async fn get_transaction_by_reference(
        &self,
        institution_id: Uuid,
        reference_number: &str,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE institution_id = $1 AND reference_number = $2"
        ))
        .bind(institution_id)
        .bind(reference_number)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    /// Correlates an inbound Gateway callback to its owning transaction by
    /// session id, checking the original FTD session as well as the FTC and
    /// Reversal sessions.
    pub async fn get_transaction_by_any_session(&self, session_id: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions \
             WHERE session_id = $1 OR ftc_session_id = $1 OR reversal_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(row_to_transaction).transpose()
    }

    /// Applies a state transition under a row lock. `mutate` receives the
    /// locked row (already moved to `to`, with `completed_at` stamped if
    /// `to` is terminal) and may set any additional fields before the write
    /// lands. Returns `Err(InvalidStateTransition)` without touching the row
    /// if `current.status -> to` is not a legal edge.
    pub async fn apply_transition(
        &self,
        id: Uuid,
        to: TransactionStatus,
        mutate: impl FnOnce(&mut Transaction),
    ) -> Result<Transaction> {
        let mut db_tx = self.pool().begin().await?;
        let mut updated = lock_row(&mut db_tx, id).await?;

        let from = updated.status;
        validate_transition(from, to)?;

        let now = Utc::now();
        updated.status = to;
        updated.updated_at = now;
        if to.is_terminal() {
            updated.completed_at = Some(now);
        }
        mutate(&mut updated);

        persist(&mut db_tx, &updated).await?;
        db_tx.commit().await?;

        self.record_audit(
            Some(updated.id),
            AuditSeverity::Info,
            &format!("status transition: {} -> {}", from.as_str(), to.as_str()),
            None,
        )
        .await?;

        Ok(updated)
    }

    /// Mutates bookkeeping fields (TSQ scheduling, reversal counters, audit
    /// flags, ...) under the same row lock as [`Self::apply_transition`]
    /// without crossing a state-machine edge. Used when a leg's outcome
    /// doesn't change `status` — e.g. a reversal TSQ still leaves the
    /// transaction in `REVERSAL_PENDING`.
    pub async fn update_fields(&self, id: Uuid, mutate: impl FnOnce(&mut Transaction)) -> Result<Transaction> {
        let mut db_tx = self.pool().begin().await?;
        let mut updated = lock_row(&mut db_tx, id).await?;

        updated.updated_at = Utc::now();
        mutate(&mut updated);

        persist(&mut db_tx, &updated).await?;
        db_tx.commit().await?;
        Ok(updated)
    }

    /// Claims up to `limit` non-terminal, non-reversal transactions whose
    /// `timeout_at` has elapsed, for the Timeout Worker. Uses
    /// `SKIP LOCKED` so concurrent timeout-worker instances never collide.
    pub async fn claim_timed_out(&self, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions \
             WHERE timeout_at < now() \
               AND status NOT IN ('COMPLETED','FAILED','TIMEOUT','REVERSAL_PENDING','REVERSAL_SUCCESS','REVERSAL_FAILED') \
             ORDER BY timeout_at ASC LIMIT $1 FOR UPDATE SKIP LOCKED"
        ))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_transaction).collect()
    }

    /// Claims transactions in `FTD_SUCCESS` for the FTC Worker.
    pub async fn claim_ftd_success(&self, limit: i64) -> Result<Vec<Transaction>> {
        self.claim_by_status(TransactionStatus::FtdSuccess, limit).await
    }

    /// Claims transactions due for reversal for the Reversal Worker (spec
    /// §4.6): `reversal_required` and under the attempt ceiling.
    pub async fn claim_due_reversals(&self, max_attempts: i32, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions \
             WHERE reversal_required AND status = 'REVERSAL_PENDING' AND reversal_attempts < $1 \
             ORDER BY updated_at ASC LIMIT $2 FOR UPDATE SKIP LOCKED"
        ))
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn claim_by_status(&self, status: TransactionStatus, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE status = $1 \
             ORDER BY updated_at ASC LIMIT $2 FOR UPDATE SKIP LOCKED"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_transaction).collect()
    }
}
