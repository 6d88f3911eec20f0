//! TSQ reconciliation queue: schedules and claims Transaction
//! Status Query tasks against legs the Gateway left ambiguous.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::DatabaseManager;
use crate::error::Result;
use crate::types::{TsqTask, TsqType};

fn row_to_tsq_task(row: &sqlx::postgres::PgRow) -> Result<TsqTask> {
    let tsq_type = TsqType::from_str(row.try_get::<String, _>("tsq_type")?.as_str())
        .ok_or_else(|| crate::Error::Internal(anyhow::anyhow!("unknown tsq_type in row")))?;
    Ok(TsqTask {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        tsq_type,
        target_session_id: row.try_get("target_session_id")?,
        target_tracking_number: row.try_get("target_tracking_number")?,
        scheduled_for: row.try_get("scheduled_for")?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
    })
}

impl DatabaseManager {
    pub async fn schedule_tsq(
        &self,
        transaction_id: Uuid,
        tsq_type: TsqType,
        target_session_id: &str,
        target_tracking_number: &str,
        scheduled_for: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tsq_tasks \
                (id, transaction_id, tsq_type, target_session_id, target_tracking_number, \
                 scheduled_for, max_attempts) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(id)
        .bind(transaction_id)
        .bind(tsq_type.as_str())
        .bind(target_session_id)
        .bind(target_tracking_number)
        .bind(scheduled_for)
        .bind(max_attempts)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// Claims up to `limit` due, incomplete TSQ tasks still under their
    /// attempt ceiling, for the TSQ Worker.
    pub async fn claim_due_tsq(&self, limit: i64) -> Result<Vec<TsqTask>> {
        let rows = sqlx::query(
            "SELECT id, transaction_id, tsq_type, target_session_id, target_tracking_number, \
                    scheduled_for, attempts, max_attempts \
             FROM tsq_tasks \
             WHERE NOT completed AND scheduled_for <= now() AND attempts < max_attempts \
             ORDER BY scheduled_for ASC LIMIT $1 FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_tsq_task).collect()
    }

    /// Bumps the attempt counter and, when still inconclusive, reschedules
    /// for the next poll.
    pub async fn reschedule_tsq(&self, id: Uuid, next_attempt_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE tsq_tasks SET attempts = attempts + 1, scheduled_for = $2 WHERE id = $1")
            .bind(id)
            .bind(next_attempt_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn complete_tsq(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE tsq_tasks SET completed = TRUE, attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
