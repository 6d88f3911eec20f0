//! Submission API: `submitNEC`, `submitFT`, `submitTSQ`. This is
//! an in-process callable surface, not an HTTP endpoint — the caller
//! (outside this crate's scope) handles institution auth, idempotency-key
//! caching, and request parsing before reaching here.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::amount::format_amount;
use crate::config::EngineConfig;
use crate::db::transactions::NewTransaction;
use crate::db::DatabaseManager;
use crate::error::{Error, Result};
use crate::gateway::payload::{is_inconclusive, is_success};
use crate::gateway::{build_ftd_request, build_nec_request, build_tsq_request, GatewayClient};
use crate::ids::mint_correlation_pair;
use crate::service::notify::enqueue_terminal_callback;
use crate::types::{event_sequence, GatewayEventType, Transaction, TransactionStatus, TransactionType};

/// Everything the Submission API needs to know about the calling
/// institution for a single request. Credential validation and the
/// institution/participant registry themselves live outside this crate;
/// this struct is what a caller is expected to have resolved already.
#[derive(Debug, Clone)]
pub struct InstitutionContext {
    pub institution_id: Uuid,
    pub credential_id: Uuid,
    /// The institution's default webhook, used when the request doesn't
    /// carry its own `callbackUrl`.
    pub default_callback_url: String,
}

#[derive(Debug, Clone)]
pub struct SubmitNecRequest {
    pub reference_number: String,
    pub src_bank_code: String,
    pub src_account_number: String,
    pub src_account_name: String,
    pub dest_bank_code: String,
    pub dest_account_number: String,
    pub narration: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitNecResult {
    pub response_code: String,
    pub session_id: String,
    pub reference_number: String,
    pub dest_account_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitFtRequest {
    pub reference_number: String,
    pub src_bank_code: String,
    pub src_account_number: String,
    pub src_account_name: String,
    pub dest_bank_code: String,
    pub dest_account_number: String,
    pub dest_account_name: String,
    pub amount: Decimal,
    pub narration: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitFtResult {
    pub response_code: &'static str,
    pub status: &'static str,
    pub session_id: String,
    pub reference_number: String,
}

#[derive(Debug, Clone)]
pub struct SubmitTsqRequest {
    pub reference_number: String,
}

#[derive(Debug, Clone)]
pub struct SubmitTsqResult {
    pub response_code: Option<String>,
    pub status: TransactionStatus,
    pub session_id: String,
}

pub struct SubmissionApi {
    db: DatabaseManager,
    gateway: Arc<dyn GatewayClient>,
    config: EngineConfig,
}

impl SubmissionApi {
    pub fn new(db: DatabaseManager, gateway: Arc<dyn GatewayClient>, config: EngineConfig) -> Self {
        Self { db, gateway, config }
    }

    async fn validate_participants(&self, src_bank_code: &str, dest_bank_code: &str) -> Result<()> {
        if !self.db.is_active_participant(src_bank_code).await? {
            return Err(Error::InvalidParticipant(src_bank_code.to_string()));
        }
        if !self.db.is_active_participant(dest_bank_code).await? {
            return Err(Error::InvalidParticipant(dest_bank_code.to_string()));
        }
        Ok(())
    }

    fn effective_callback_url(requested: Option<String>, institution: &InstitutionContext) -> Option<String> {
        Some(requested.unwrap_or_else(|| institution.default_callback_url.clone()))
    }

    /// `submitNEC`. Synchronous: validates, creates the row,
    /// calls the Gateway inline, and settles the transaction to a terminal
    /// state before returning.
    pub async fn submit_nec(
        &self,
        req: SubmitNecRequest,
        institution: &InstitutionContext,
    ) -> Result<SubmitNecResult> {
        self.validate_participants(&req.src_bank_code, &req.dest_bank_code).await?;

        let pair = mint_correlation_pair();
        let now = Utc::now();
        let timeout_at = now + Duration::minutes(self.config.timeouts.nec_timeout_min);

        let tx = self
            .db
            .create_transaction(NewTransaction {
                id: Uuid::new_v4(),
                reference_number: req.reference_number.clone(),
                session_id: pair.session_id.clone(),
                tracking_number: pair.tracking_number.clone(),
                transaction_type: TransactionType::Nec,
                institution_id: institution.institution_id,
                credential_id: institution.credential_id,
                src_bank_code: req.src_bank_code.clone(),
                src_account_number: req.src_account_number.clone(),
                src_account_name: req.src_account_name.clone(),
                dest_bank_code: req.dest_bank_code.clone(),
                dest_account_number: req.dest_account_number.clone(),
                dest_account_name: String::new(),
                amount: Decimal::ZERO,
                narration: req.narration.clone(),
                callback_url: Self::effective_callback_url(req.callback_url, institution),
                status: TransactionStatus::Initiated,
                timeout_at,
            })
            .await?;

        let tx = self.db.apply_transition(tx.id, TransactionStatus::NecPending, |_| {}).await?;

        let gw_req = build_nec_request(
            &self.config.gateway,
            &tx.session_id,
            &tx.tracking_number,
            &tx.src_bank_code,
            &tx.dest_bank_code,
            &tx.dest_account_number,
        );
        let request_payload = serde_json::to_value(&gw_req)
            .map_err(|e| Error::Internal(anyhow::anyhow!("NEC request serialization failed: {e}")))?;
        self.db
            .record_event_request(
                tx.id,
                GatewayEventType::NecRequest,
                event_sequence::NEC_REQUEST,
                &tx.session_id,
                &tx.tracking_number,
                &self.config.gateway.nec_function_code,
                &request_payload,
            )
            .await?;

        let response = self.gateway.name_enquiry(gw_req).await?;
        self.db
            .record_event_response(
                tx.id,
                event_sequence::NEC_REQUEST,
                &response.raw_response,
                response.action_code.as_deref(),
                response.status_code.as_deref(),
                response.duration_ms,
            )
            .await?;

        let action_code = response.action_code.clone().unwrap_or_default();
        if is_success(response.action_code.as_deref()) {
            let payee_name = response.payee_name.clone();
            let tx = self
                .db
                .apply_transition(tx.id, TransactionStatus::NecSuccess, |t| {
                    t.nec_action_code = response.action_code.clone();
                    t.payee_name = payee_name.clone();
                })
                .await?;
            self.db.apply_transition(tx.id, TransactionStatus::Completed, |_| {}).await?;
            Ok(SubmitNecResult {
                response_code: action_code,
                session_id: tx.session_id,
                reference_number: tx.reference_number,
                dest_account_name: response.payee_name,
            })
        } else {
            let tx = self
                .db
                .apply_transition(tx.id, TransactionStatus::NecFailed, |t| {
                    t.nec_action_code = response.action_code.clone();
                })
                .await?;
            self.db.apply_transition(tx.id, TransactionStatus::Failed, |_| {}).await?;
            Ok(SubmitNecResult {
                response_code: action_code,
                session_id: tx.session_id,
                reference_number: tx.reference_number,
                dest_account_name: None,
            })
        }
    }

    /// `submitFT`. Creates the row, moves it to `FTD_PENDING`,
    /// and fires the FTD leg without awaiting its eventual callback — the
    /// Callback Processor, TSQ, and Timeout workers own what happens next.
    pub async fn submit_ft(&self, req: SubmitFtRequest, institution: &InstitutionContext) -> Result<SubmitFtResult> {
        self.validate_participants(&req.src_bank_code, &req.dest_bank_code).await?;

        let pair = mint_correlation_pair();
        let now = Utc::now();
        let timeout_at = now + Duration::minutes(self.config.timeouts.ft_timeout_min);

        let tx = self
            .db
            .create_transaction(NewTransaction {
                id: Uuid::new_v4(),
                reference_number: req.reference_number.clone(),
                session_id: pair.session_id.clone(),
                tracking_number: pair.tracking_number.clone(),
                transaction_type: TransactionType::Ft,
                institution_id: institution.institution_id,
                credential_id: institution.credential_id,
                src_bank_code: req.src_bank_code.clone(),
                src_account_number: req.src_account_number.clone(),
                src_account_name: req.src_account_name.clone(),
                dest_bank_code: req.dest_bank_code.clone(),
                dest_account_number: req.dest_account_number.clone(),
                dest_account_name: req.dest_account_name.clone(),
                amount: req.amount,
                narration: req.narration.clone(),
                callback_url: Self::effective_callback_url(req.callback_url, institution),
                status: TransactionStatus::Initiated,
                timeout_at,
            })
            .await?;

        let tx = self.db.apply_transition(tx.id, TransactionStatus::FtdPending, |_| {}).await?;

        let formatted_amount = format_amount(tx.amount);
        let gw_req = build_ftd_request(
            &self.config.gateway,
            &tx.session_id,
            &tx.tracking_number,
            &tx.src_bank_code,
            &tx.src_account_number,
            &tx.src_account_name,
            &tx.dest_bank_code,
            &tx.dest_account_number,
            &tx.dest_account_name,
            &formatted_amount,
            &tx.narration,
            &self.config.advertised_callback_url,
        );

        // Fire-and-forget: the task below records the request/response
        // events and only short-circuits the state machine on an immediate,
        // definite (non-inconclusive) Gateway failure. Success and
        // inconclusive outcomes wait for the real FTD_CALLBACK, which the
        // Callback Processor Worker owns.
        let db = self.db.clone();
        let gateway = self.gateway.clone();
        let client_callback_cfg = self.config.client_callback.clone();
        let tx_id = tx.id;
        let session_id = tx.session_id.clone();
        let tracking_number = tx.tracking_number.clone();
        let function_code = self.config.gateway.ftd_function_code.clone();
        tokio::spawn(async move {
            let request_payload = match serde_json::to_value(&gw_req) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(transaction_id = %tx_id, error = %e, "failed to serialize FTD request");
                    return;
                }
            };
            if let Err(e) = db
                .record_event_request(
                    tx_id,
                    GatewayEventType::FtdRequest,
                    event_sequence::FTD_REQUEST,
                    &session_id,
                    &tracking_number,
                    &function_code,
                    &request_payload,
                )
                .await
            {
                tracing::error!(transaction_id = %tx_id, error = %e, "failed to record FTD request event");
            }

            match gateway.ftd(gw_req).await {
                Ok(response) => {
                    if let Err(e) = db
                        .record_event_response(
                            tx_id,
                            event_sequence::FTD_REQUEST,
                            &response.raw_response,
                            response.action_code.as_deref(),
                            response.status_code.as_deref(),
                            response.duration_ms,
                        )
                        .await
                    {
                        tracing::error!(transaction_id = %tx_id, error = %e, "failed to record FTD response event");
                    }

                    let inconclusive = is_inconclusive(response.action_code.as_deref());
                    let success = is_success(response.action_code.as_deref());
                    if !inconclusive && !success {
                        tracing::warn!(transaction_id = %tx_id, action_code = ?response.action_code, "immediate FTD failure");
                        let action_code = response.action_code.clone();
                        if let Ok(failed_tx) = db
                            .apply_transition(tx_id, TransactionStatus::FtdFailed, |t| {
                                t.ftd_action_code = action_code.clone();
                            })
                            .await
                        {
                            if let Ok(failed_tx) = db.apply_transition(failed_tx.id, TransactionStatus::Failed, |_| {}).await
                            {
                                let _ = enqueue_terminal_callback(
                                    &db,
                                    &client_callback_cfg,
                                    &failed_tx,
                                    crate::types::ClientOutcome::Failed,
                                    action_code.as_deref().unwrap_or("999"),
                                    "FTD leg rejected by gateway",
                                    false,
                                )
                                .await;
                            }
                        }
                    }
                }
                Err(e) => {
                    // GatewayTransport: leg stays FTD_PENDING; Timeout
                    // Worker recovers it via TSQ.
                    tracing::warn!(transaction_id = %tx_id, error = %e, "FTD request transport failure");
                }
            }
        });

        Ok(SubmitFtResult {
            response_code: "000",
            status: "PENDING",
            session_id: tx.session_id,
            reference_number: tx.reference_number,
        })
    }

    /// `submitTSQ`: ad-hoc status query, never mutates the
    /// state machine. If the transaction is already terminal, its stored
    /// result is returned without a fresh Gateway round-trip.
    pub async fn submit_tsq(&self, req: SubmitTsqRequest, institution: &InstitutionContext) -> Result<SubmitTsqResult> {
        let tx = self
            .db
            .get_transaction_by_reference(institution.institution_id, &req.reference_number)
            .await?
            .ok_or_else(|| Error::TransactionNotFound(req.reference_number.clone()))?;

        if tx.status.is_terminal() {
            return Ok(SubmitTsqResult {
                response_code: terminal_action_code(&tx),
                status: tx.status,
                session_id: tx.session_id,
            });
        }

        let gw_req = build_tsq_request(&self.config.gateway, &tx.session_id, &tx.tracking_number);
        let response = self.gateway.tsq(gw_req).await?;
        Ok(SubmitTsqResult {
            response_code: response.action_code,
            status: tx.status,
            session_id: tx.session_id,
        })
    }
}

/// Best-effort action code to echo for an already-terminal transaction:
/// whichever leg most recently settled it.
fn terminal_action_code(tx: &Transaction) -> Option<String> {
    tx.reversal_action_code
        .clone()
        .or_else(|| tx.ftc_action_code.clone())
        .or_else(|| tx.ftd_action_code.clone())
        .or_else(|| tx.nec_action_code.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::gateway::test_support::{response, ScriptedGatewayClient};

    fn institution() -> InstitutionContext {
        InstitutionContext {
            institution_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            default_callback_url: "https://institution.example/webhook".to_string(),
        }
    }

    #[tokio::test]
    async fn nec_success_settles_to_completed_with_payee_name() {
        let Some(db) = test_db().await else { return };
        let mut fake = ScriptedGatewayClient::new();
        let mut ok = response(Some("000"), Some("00"));
        ok.payee_name = Some("Bob Recipient".to_string());
        fake.push_nec(ok);
        let gateway: Arc<dyn GatewayClient> = Arc::new(fake);
        let api = SubmissionApi::new(db.clone(), gateway, EngineConfig::default());
        let institution = institution();

        let result = api
            .submit_nec(
                SubmitNecRequest {
                    reference_number: format!("nec-{}", Uuid::new_v4()),
                    src_bank_code: "300307".into(),
                    src_account_number: "1111111111".into(),
                    src_account_name: "Alice".into(),
                    dest_bank_code: "300304".into(),
                    dest_account_number: "2222222222".into(),
                    narration: "lookup".into(),
                    callback_url: None,
                },
                &institution,
            )
            .await
            .unwrap();

        assert_eq!(result.response_code, "000");
        assert_eq!(result.dest_account_name.as_deref(), Some("Bob Recipient"));

        let tx = db.get_transaction_by_reference(institution.institution_id, &result.reference_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn nec_failure_settles_to_failed() {
        let Some(db) = test_db().await else { return };
        let mut fake = ScriptedGatewayClient::new();
        fake.push_nec(response(Some("057"), Some("00")));
        let gateway: Arc<dyn GatewayClient> = Arc::new(fake);
        let api = SubmissionApi::new(db.clone(), gateway, EngineConfig::default());
        let institution = institution();

        let result = api
            .submit_nec(
                SubmitNecRequest {
                    reference_number: format!("nec-{}", Uuid::new_v4()),
                    src_bank_code: "300307".into(),
                    src_account_number: "1111111111".into(),
                    src_account_name: "Alice".into(),
                    dest_bank_code: "300304".into(),
                    dest_account_number: "9999999999".into(),
                    narration: "lookup".into(),
                    callback_url: None,
                },
                &institution,
            )
            .await
            .unwrap();

        assert_eq!(result.response_code, "057");
        let tx = db.get_transaction_by_reference(institution.institution_id, &result.reference_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn ft_submission_returns_pending_immediately() {
        let Some(db) = test_db().await else { return };
        let mut fake = ScriptedGatewayClient::new();
        fake.push_ftd(response(None, None));
        let gateway: Arc<dyn GatewayClient> = Arc::new(fake);
        let api = SubmissionApi::new(db.clone(), gateway, EngineConfig::default());
        let institution = institution();

        let result = api
            .submit_ft(
                SubmitFtRequest {
                    reference_number: format!("ft-{}", Uuid::new_v4()),
                    src_bank_code: "300307".into(),
                    src_account_number: "1111111111".into(),
                    src_account_name: "Alice".into(),
                    dest_bank_code: "300304".into(),
                    dest_account_number: "2222222222".into(),
                    dest_account_name: "Bob".into(),
                    amount: Decimal::new(100050, 2),
                    narration: "payment".into(),
                    callback_url: None,
                },
                &institution,
            )
            .await
            .unwrap();

        assert_eq!(result.response_code, "000");
        assert_eq!(result.status, "PENDING");

        let tx = db.get_transaction_by_reference(institution.institution_id, &result.reference_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::FtdPending);
    }
}
