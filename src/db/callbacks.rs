//! Raw inbound Gateway callback storage and claiming. The
//! Callback Intake writes a row here and acknowledges immediately; the
//! Callback Processor worker claims and interprets it afterward.

use sqlx::Row;
use uuid::Uuid;

use super::DatabaseManager;
use crate::error::Result;
use crate::types::{GatewayCallback, GatewayCallbackStatus};

fn row_to_callback(row: &sqlx::postgres::PgRow) -> Result<GatewayCallback> {
    let status = GatewayCallbackStatus::from_str(row.try_get::<String, _>("status")?.as_str())
        .ok_or_else(|| crate::Error::Internal(anyhow::anyhow!("unknown gateway_callback status in row")))?;
    Ok(GatewayCallback {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        function_code: row.try_get("function_code")?,
        action_code: row.try_get("action_code")?,
        status_code: row.try_get("status_code")?,
        raw_payload: row.try_get("raw_payload")?,
        source_ip: row.try_get("source_ip")?,
        status,
        received_at: row.try_get("received_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

impl DatabaseManager {
    /// Persists a raw inbound callback untouched. Called by the Callback
    /// Intake before it replies 200 to the Gateway.
    pub async fn insert_gateway_callback(
        &self,
        session_id: &str,
        function_code: Option<&str>,
        action_code: Option<&str>,
        status_code: Option<&str>,
        raw_payload: &serde_json::Value,
        source_ip: Option<&str>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO gateway_callbacks \
                (id, session_id, function_code, action_code, status_code, raw_payload, source_ip) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(id)
        .bind(session_id)
        .bind(function_code)
        .bind(action_code)
        .bind(status_code)
        .bind(raw_payload)
        .bind(source_ip)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// Claims up to `limit` pending callbacks for the Callback Processor
    /// worker, oldest first, skipping rows another worker already holds.
    pub async fn claim_pending_callbacks(&self, limit: i64) -> Result<Vec<GatewayCallback>> {
        let rows = sqlx::query(
            "SELECT id, session_id, function_code, action_code, status_code, raw_payload, \
                    source_ip, status, received_at, processed_at \
             FROM gateway_callbacks WHERE status = 'PENDING' \
             ORDER BY received_at ASC LIMIT $1 FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_callback).collect()
    }

    pub async fn mark_callback(&self, id: Uuid, status: GatewayCallbackStatus) -> Result<()> {
        sqlx::query("UPDATE gateway_callbacks SET status = $2, processed_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;

    #[tokio::test]
    async fn claim_then_mark_processed_removes_from_pending_pool() {
        let Some(db) = test_db().await else { return };
        let session_id = format!("SES-{}", Uuid::new_v4());
        db.insert_gateway_callback(&session_id, Some("241"), Some("000"), Some("00"), &serde_json::json!({}), None)
            .await
            .unwrap();

        let claimed = db.claim_pending_callbacks(10).await.unwrap();
        let target = claimed.iter().find(|c| c.session_id == session_id).unwrap();
        db.mark_callback(target.id, GatewayCallbackStatus::Processed).await.unwrap();

        let remaining = db.claim_pending_callbacks(10).await.unwrap();
        assert!(remaining.iter().all(|c| c.session_id != session_id));
    }
}
