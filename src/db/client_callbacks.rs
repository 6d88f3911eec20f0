//! Outgoing client webhook delivery queue. The dispatcher
//! worker claims due rows, posts the signed payload, and reschedules on
//! failure with the configured backoff.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::DatabaseManager;
use crate::error::Result;
use crate::types::{ClientCallback, ClientCallbackStatus};

fn row_to_client_callback(row: &sqlx::postgres::PgRow) -> Result<ClientCallback> {
    let status = ClientCallbackStatus::from_str(row.try_get::<String, _>("status")?.as_str())
        .ok_or_else(|| crate::Error::Internal(anyhow::anyhow!("unknown client_callback status in row")))?;
    Ok(ClientCallback {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        target_url: row.try_get("target_url")?,
        payload: row.try_get("payload")?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        status,
        last_response_status: row.try_get("last_response_status")?,
        last_response_body: row.try_get("last_response_body")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        delivered_at: row.try_get("delivered_at")?,
    })
}

impl DatabaseManager {
    pub async fn enqueue_client_callback(
        &self,
        transaction_id: Uuid,
        target_url: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO client_callbacks \
                (id, transaction_id, target_url, payload, max_attempts) \
             VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(id)
        .bind(transaction_id)
        .bind(target_url)
        .bind(payload)
        .bind(max_attempts)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// Claims up to `limit` due deliveries (`next_attempt_at` elapsed, still
    /// `PENDING`) for the Client Callback Dispatcher.
    pub async fn claim_due_client_callbacks(&self, limit: i64) -> Result<Vec<ClientCallback>> {
        let rows = sqlx::query(
            "SELECT id, transaction_id, target_url, payload, attempts, max_attempts, \
                    next_attempt_at, status, last_response_status, last_response_body, \
                    last_error, created_at, delivered_at \
             FROM client_callbacks WHERE status = 'PENDING' AND next_attempt_at <= now() \
             ORDER BY next_attempt_at ASC LIMIT $1 FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_client_callback).collect()
    }

    pub async fn mark_client_callback_delivered(&self, id: Uuid, response_status: i32, response_body: &str) -> Result<()> {
        sqlx::query(
            "UPDATE client_callbacks SET status = 'DELIVERED', delivered_at = now(), \
                attempts = attempts + 1, last_response_status = $2, last_response_body = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(response_status)
        .bind(response_body)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Records a failed delivery attempt. Reschedules with `next_attempt_at`
    /// if attempts remain under `max_attempts`, otherwise marks permanently
    /// `FAILED`.
    pub async fn mark_client_callback_retry_or_failed(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
        response_status: Option<i32>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE client_callbacks SET \
                attempts = attempts + 1, \
                last_error = $4, last_response_status = $5, \
                next_attempt_at = $2, \
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'FAILED' ELSE 'PENDING' END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(error)
        .bind(response_status)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
