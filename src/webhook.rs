//! Outgoing client webhook payload shape. Building the payload
//! is separated from sending it so the Client Callback Dispatcher worker
//! can construct, sign, and enqueue without needing a live HTTP client.

use chrono::Utc;
use serde::Serialize;

use crate::amount::format_client_timestamp;
use crate::types::{ClientOutcome, Transaction};

/// Stable-shape payload delivered to the institution's webhook. Field order
/// here is the canonical order signed over — see [`canonical_json`].
#[derive(Debug, Clone, Serialize)]
pub struct ClientWebhookPayload {
    #[serde(rename = "srcBankCode")]
    pub src_bank_code: String,
    #[serde(rename = "srcAccountNumber")]
    pub src_account_number: String,
    #[serde(rename = "referenceNumber")]
    pub reference_number: String,
    #[serde(rename = "requestTimestamp")]
    pub request_timestamp: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "destBankCode")]
    pub dest_bank_code: String,
    #[serde(rename = "destAccountNumber")]
    pub dest_account_number: String,
    pub narration: String,
    #[serde(rename = "responseCode")]
    pub response_code: String,
    #[serde(rename = "responseMessage")]
    pub response_message: String,
    pub status: &'static str,
    #[serde(rename = "requiresManualIntervention", skip_serializing_if = "std::ops::Not::not")]
    pub requires_manual_intervention: bool,
}

/// Builds the terminal-notification payload for a transaction. `response_code`
/// and `response_message` describe the leg that drove the outcome (e.g. the
/// FTD/FTC action code and a human-readable reason); `requires_manual_intervention`
/// is set for the reversal-failed / lost-funds scenario.
pub fn build_payload(
    tx: &Transaction,
    outcome: ClientOutcome,
    response_code: &str,
    response_message: &str,
    requires_manual_intervention: bool,
) -> ClientWebhookPayload {
    ClientWebhookPayload {
        src_bank_code: tx.src_bank_code.clone(),
        src_account_number: tx.src_account_number.clone(),
        reference_number: tx.reference_number.clone(),
        request_timestamp: format_client_timestamp(Utc::now()),
        session_id: tx.session_id.clone(),
        dest_bank_code: tx.dest_bank_code.clone(),
        dest_account_number: tx.dest_account_number.clone(),
        narration: tx.narration.clone(),
        response_code: response_code.to_string(),
        response_message: response_message.to_string(),
        status: outcome.as_str(),
        requires_manual_intervention,
    }
}

/// Serializes the payload deterministically for signing. `serde_json`
/// preserves struct field declaration order, so this is stable across runs
/// without a separate canonicalization pass.
pub fn canonical_json(payload: &ClientWebhookPayload) -> String {
    serde_json::to_string(payload).expect("webhook payload is always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TransactionStatus, TransactionType};
    use chrono::Duration;
    use uuid::Uuid;

    fn sample_tx() -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            reference_number: "ref-1".into(),
            session_id: "SES1".into(),
            tracking_number: "TRK1".into(),
            transaction_type: TransactionType::Ft,
            institution_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            src_bank_code: "300307".into(),
            src_account_number: "1111111111".into(),
            src_account_name: "Alice".into(),
            dest_bank_code: "300304".into(),
            dest_account_number: "2222222222".into(),
            dest_account_name: "Bob".into(),
            amount: rust_decimal::Decimal::new(100050, 2),
            narration: "payment".into(),
            callback_url: None,
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: Some(Utc::now()),
            timeout_at: Utc::now() + Duration::minutes(60),
            nec_action_code: None,
            ftd_action_code: Some("000".into()),
            ftc_action_code: Some("000".into()),
            reversal_action_code: None,
            ftc_session_id: Some("SES2".into()),
            ftc_tracking_number: Some("TRK2".into()),
            reversal_session_id: None,
            reversal_tracking_number: None,
            tsq_required: false,
            tsq_next_attempt_at: None,
            tsq_attempts: 0,
            reversal_required: false,
            reversal_attempts: 0,
            client_callback_sent: false,
            client_callback_sent_at: None,
            payee_name: None,
        }
    }

    #[test]
    fn success_payload_omits_manual_intervention_flag() {
        let tx = sample_tx();
        let payload = build_payload(&tx, ClientOutcome::Successful, "000", "Approved", false);
        let json = canonical_json(&payload);
        assert!(!json.contains("requiresManualIntervention"));
        assert!(json.contains("\"status\":\"SUCCESSFUL\""));
    }

    #[test]
    fn reversal_failure_payload_flags_manual_intervention() {
        let tx = sample_tx();
        let payload = build_payload(
            &tx,
            ClientOutcome::Failed,
            "096",
            "reversal failed, manual intervention required",
            true,
        );
        let json = canonical_json(&payload);
        assert!(json.contains("\"requiresManualIntervention\":true"));
    }

    #[test]
    fn payload_field_order_is_stable_for_signing() {
        let tx = sample_tx();
        let a = canonical_json(&build_payload(&tx, ClientOutcome::Successful, "000", "ok", false));
        let b = canonical_json(&build_payload(&tx, ClientOutcome::Successful, "000", "ok", false));
        assert_eq!(a, b);
    }
}
