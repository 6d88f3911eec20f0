//! Append-only audit trail. Every state transition, Gateway oddity, and
//! reversal outcome lands here for operators — this is what gets read
//! during an incident, not the application logs.

use uuid::Uuid;

use super::DatabaseManager;
use crate::error::Result;
use crate::types::AuditSeverity;

impl DatabaseManager {
    pub async fn record_audit(
        &self,
        transaction_id: Option<Uuid>,
        severity: AuditSeverity,
        message: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, transaction_id, severity, message, metadata) VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(Uuid::new_v4())
        .bind(transaction_id)
        .bind(severity.as_str())
        .bind(message)
        .bind(metadata)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
