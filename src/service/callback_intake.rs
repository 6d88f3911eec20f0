//! Callback Intake: the thin entry point for inbound Gateway
//! callbacks. Persists the raw payload and returns — correlation,
//! interpretation, and the FTD/FTC/Reversal decision rules are the
//! Callback Processor Worker's job, not this one's.
//!
//! Persistence happens before any acknowledgement is sent upstream (the
//! HTTP 200-regardless-of-outcome behavior lives in the out-of-scope
//! routing layer; this function simply never fails in a way that should
//! change that reply).

use uuid::Uuid;

use crate::db::DatabaseManager;
use crate::error::Result;
use crate::gateway::payload::InboundCallback;
use crate::types::GatewayCallbackStatus;

pub struct CallbackIntake {
    db: DatabaseManager,
}

impl CallbackIntake {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    /// Persists one raw inbound callback. Always succeeds from the
    /// caller's perspective: a callback that doesn't even parse is stored
    /// verbatim with `status = ERROR` rather than rejected, so nothing the
    /// Gateway sends is ever silently dropped.
    pub async fn intake(&self, raw_payload: serde_json::Value, source_ip: Option<String>) -> Result<Uuid> {
        match serde_json::from_value::<InboundCallback>(raw_payload.clone()) {
            Ok(parsed) => {
                let id = self
                    .db
                    .insert_gateway_callback(
                        &parsed.session_id,
                        parsed.function_code.as_deref(),
                        parsed.action_code.as_deref(),
                        parsed.status_code.as_deref(),
                        &raw_payload,
                        source_ip.as_deref(),
                    )
                    .await?;
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "inbound gateway callback did not parse; storing as ERROR");
                let id = self
                    .db
                    .insert_gateway_callback("UNPARSEABLE", None, None, None, &raw_payload, source_ip.as_deref())
                    .await?;
                self.db.mark_callback(id, GatewayCallbackStatus::Error).await?;
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;

    #[tokio::test]
    async fn accepts_camel_case_callback() {
        let Some(db) = test_db().await else { return };
        let intake = CallbackIntake::new(db.clone());
        let id = intake
            .intake(
                serde_json::json!({"sessionId": "SES-camel", "functionCode": "241", "actionCode": "000"}),
                Some("10.0.0.1".to_string()),
            )
            .await
            .unwrap();
        let claimed = db.claim_pending_callbacks(50).await.unwrap();
        assert!(claimed.iter().any(|c| c.id == id && c.session_id == "SES-camel"));
    }

    #[tokio::test]
    async fn malformed_payload_is_stored_as_error_not_rejected() {
        let Some(db) = test_db().await else { return };
        let intake = CallbackIntake::new(db.clone());
        // no sessionId/session_id at all
        let id = intake.intake(serde_json::json!({"garbage": true}), None).await.unwrap();
        let claimed = db.claim_pending_callbacks(50).await.unwrap();
        assert!(claimed.iter().all(|c| c.id != id));
    }
}
