//! Gateway event log: one row per request/response leg, keyed by the fixed
//! sequence numbers in [`crate::types::event_sequence`].

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::DatabaseManager;
use crate::error::Result;
use crate::types::{GatewayEvent, GatewayEventType};

impl DatabaseManager {
    /// Records the outbound leg of a Gateway event at the moment the request
    /// is sent, before the response is known.
    pub async fn record_event_request(
        &self,
        transaction_id: Uuid,
        event_type: GatewayEventType,
        event_sequence: i32,
        session_id: &str,
        tracking_number: &str,
        function_code: &str,
        request_payload: &serde_json::Value,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO gateway_events \
                (id, transaction_id, event_type, event_sequence, session_id, tracking_number, \
                 function_code, request_payload) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8) \
             ON CONFLICT (transaction_id, event_sequence) DO NOTHING",
        )
        .bind(id)
        .bind(transaction_id)
        .bind(event_type.as_str())
        .bind(event_sequence)
        .bind(session_id)
        .bind(tracking_number)
        .bind(function_code)
        .bind(request_payload)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    /// Fills in the response half of an already-recorded event. Never
    /// overwrites a response that's already landed — a leg is recorded once.
    pub async fn record_event_response(
        &self,
        transaction_id: Uuid,
        event_sequence: i32,
        response_payload: &serde_json::Value,
        action_code: Option<&str>,
        status_label: Option<&str>,
        duration_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE gateway_events SET \
                response_payload = $3, action_code = $4, status_label = $5, \
                response_received_at = now(), duration_ms = $6 \
             WHERE transaction_id = $1 AND event_sequence = $2 AND response_payload IS NULL",
        )
        .bind(transaction_id)
        .bind(event_sequence)
        .bind(response_payload)
        .bind(action_code)
        .bind(status_label)
        .bind(duration_ms)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_events(&self, transaction_id: Uuid) -> Result<Vec<GatewayEvent>> {
        let rows = sqlx::query(
            "SELECT id, transaction_id, event_type, event_sequence, session_id, tracking_number, \
                    function_code, request_payload, response_payload, action_code, status_label, \
                    request_sent_at, response_received_at, duration_ms \
             FROM gateway_events WHERE transaction_id = $1 ORDER BY event_sequence ASC",
        )
        .bind(transaction_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let event_type_str: String = row.try_get("event_type")?;
                let event_type = event_type_from_str(&event_type_str);
                Ok(GatewayEvent {
                    id: row.try_get("id")?,
                    transaction_id: row.try_get("transaction_id")?,
                    event_type,
                    event_sequence: row.try_get("event_sequence")?,
                    session_id: row.try_get("session_id")?,
                    tracking_number: row.try_get("tracking_number")?,
                    function_code: row.try_get("function_code")?,
                    request_payload: row.try_get("request_payload")?,
                    response_payload: row.try_get("response_payload")?,
                    action_code: row.try_get("action_code")?,
                    status_label: row.try_get("status_label")?,
                    request_sent_at: row.try_get("request_sent_at")?,
                    response_received_at: row.try_get::<Option<DateTime<Utc>>, _>("response_received_at")?,
                    duration_ms: row.try_get("duration_ms")?,
                })
            })
            .collect()
    }
}

fn event_type_from_str(s: &str) -> GatewayEventType {
    match s {
        "NEC_REQUEST" => GatewayEventType::NecRequest,
        "FTD_REQUEST" => GatewayEventType::FtdRequest,
        "FTD_CALLBACK" => GatewayEventType::FtdCallback,
        "FTC_REQUEST" => GatewayEventType::FtcRequest,
        "FTC_CALLBACK" => GatewayEventType::FtcCallback,
        "REVERSAL_REQUEST" => GatewayEventType::ReversalRequest,
        "REVERSAL_CALLBACK" => GatewayEventType::ReversalCallback,
        "FTD_TSQ_RESPONSE" => GatewayEventType::FtdTsqResponse,
        "FTC_TSQ_RESPONSE" => GatewayEventType::FtcTsqResponse,
        _ => GatewayEventType::ReversalTsqResponse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::transactions::NewTransaction;
    use crate::types::{TransactionStatus, TransactionType};

    async fn seed_transaction(db: &DatabaseManager) -> Uuid {
        let id = Uuid::new_v4();
        db.create_transaction(NewTransaction {
            id,
            reference_number: format!("ref-{id}"),
            session_id: format!("SES-{id}"),
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
            amount: rust_decimal::Decimal::new(5000, 2),
            narration: "payment".into(),
            callback_url: None,
            status: TransactionStatus::FtdPending,
            timeout_at: chrono::Utc::now() + chrono::Duration::minutes(60),
        })
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn response_is_not_overwritten_once_recorded() {
        let Some(db) = test_db().await else { return };
        let tx_id = seed_transaction(&db).await;

        db.record_event_request(
            tx_id,
            GatewayEventType::FtdRequest,
            crate::types::event_sequence::FTD_REQUEST,
            "SES1",
            "TRK1",
            "241",
            &serde_json::json!({}),
        )
        .await
        .unwrap();

        db.record_event_response(
            tx_id,
            crate::types::event_sequence::FTD_REQUEST,
            &serde_json::json!({"actionCode": "000"}),
            Some("000"),
            Some("Approved"),
            120,
        )
        .await
        .unwrap();

        db.record_event_response(
            tx_id,
            crate::types::event_sequence::FTD_REQUEST,
            &serde_json::json!({"actionCode": "999"}),
            Some("999"),
            Some("Overwrite attempt"),
            5,
        )
        .await
        .unwrap();

        let events = db.list_events(tx_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action_code.as_deref(), Some("000"));
    }
}
