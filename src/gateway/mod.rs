//! Gateway Client: the stateless adapter between the core and the upstream
//! clearing gateway.

pub mod payload;

#[cfg(test)]
pub mod test_support;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Instant;

use crate::amount::format_gateway_timestamp;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use payload::{GatewayResponse, LegRequest, NecRequest, TsqRequest};

/// Everything the rest of the engine needs from the Gateway. Exposed as a
/// trait so workers and the submission API can be tested against a fake
/// implementation without a live Gateway.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn name_enquiry(&self, req: NecRequest) -> Result<GatewayResponse>;
    async fn ftd(&self, req: LegRequest) -> Result<GatewayResponse>;
    async fn ftc(&self, req: LegRequest) -> Result<GatewayResponse>;
    async fn reversal(&self, req: LegRequest) -> Result<GatewayResponse>;
    async fn tsq(&self, req: TsqRequest) -> Result<GatewayResponse>;
}

/// `reqwest`-backed implementation. Transport failures (timeouts, connection
/// refused, DNS errors) surface as [`Error::GatewayTransport`]; a parseable
/// non-2xx body is still treated as a valid Gateway response
pub struct HttpGatewayClient {
    http: Client,
    config: GatewayConfig,
}

impl HttpGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(Error::GatewayTransport)?;
        Ok(Self { http, config })
    }

    async fn post(&self, url: &str, body: &impl serde::Serialize) -> Result<GatewayResponse> {
        let started = Instant::now();
        let response = self.http.post(url).json(body).send().await?;
        let duration_ms = started.elapsed().as_millis() as i64;

        // Non-2xx responses that still carry a Gateway body are valid
        // responses; only a transport-level failure (handled by `?` above)
        // is a throwable.
        let raw_response: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        let action_code = raw_response
            .get("actionCode")
            .or_else(|| raw_response.get("action_code"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let status_code = raw_response
            .get("statusCode")
            .or_else(|| raw_response.get("status_code"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let approval_code = raw_response
            .get("approvalCode")
            .or_else(|| raw_response.get("approval_code"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let payee_name = raw_response
            .get("nameToCredit")
            .or_else(|| raw_response.get("name_to_credit"))
            .or_else(|| raw_response.get("payeeName"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(GatewayResponse {
            action_code,
            status_code,
            approval_code,
            payee_name,
            raw_response,
            duration_ms,
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn name_enquiry(&self, req: NecRequest) -> Result<GatewayResponse> {
        self.post(&self.config.nec_url, &req).await
    }

    async fn ftd(&self, req: LegRequest) -> Result<GatewayResponse> {
        self.post(&self.config.ftd_url, &req).await
    }

    async fn ftc(&self, req: LegRequest) -> Result<GatewayResponse> {
        self.post(&self.config.ftc_url, &req).await
    }

    async fn reversal(&self, req: LegRequest) -> Result<GatewayResponse> {
        // Reversal shares the FTD endpoint: it is a mirrored FTD, not a
        // distinct Gateway operation.
        self.post(&self.config.ftd_url, &req).await
    }

    async fn tsq(&self, req: TsqRequest) -> Result<GatewayResponse> {
        self.post(&self.config.tsq_url, &req).await
    }
}

/// Builds a Name Enquiry request: no amount leg, just the correlation pair
/// and the account being looked up at `destBank`.
pub fn build_nec_request(
    cfg: &GatewayConfig,
    session_id: &str,
    tracking_number: &str,
    src_bank: &str,
    dest_bank: &str,
    account_number: &str,
) -> NecRequest {
    NecRequest {
        date_time: format_gateway_timestamp(Utc::now()),
        session_id: session_id.to_string(),
        tracking_number: tracking_number.to_string(),
        function_code: cfg.nec_function_code.clone(),
        channel_code: cfg.channel_code.clone(),
        origin_bank: src_bank.to_string(),
        dest_bank: dest_bank.to_string(),
        account_number: account_number.to_string(),
    }
}

/// Builds a Transaction Status Query request against the target leg's own
/// `(sessionId, trackingNumber)`.
pub fn build_tsq_request(cfg: &GatewayConfig, session_id: &str, tracking_number: &str) -> TsqRequest {
    TsqRequest {
        date_time: format_gateway_timestamp(Utc::now()),
        session_id: session_id.to_string(),
        tracking_number: tracking_number.to_string(),
        function_code: cfg.tsq_function_code.clone(),
        channel_code: cfg.channel_code.clone(),
    }
}

/// Builds the direction-correct [`LegRequest`] for an FTD leg: debit the
/// source account, credit the destination.
pub fn build_ftd_request(
    cfg: &GatewayConfig,
    session_id: &str,
    tracking_number: &str,
    src_bank: &str,
    src_account: &str,
    src_name: &str,
    dest_bank: &str,
    dest_account: &str,
    dest_name: &str,
    amount: &str,
    narration: &str,
    callback_url: &str,
) -> LegRequest {
    LegRequest {
        date_time: format_gateway_timestamp(Utc::now()),
        session_id: session_id.to_string(),
        tracking_number: tracking_number.to_string(),
        function_code: cfg.ftd_function_code.clone(),
        channel_code: cfg.channel_code.clone(),
        origin_bank: src_bank.to_string(),
        dest_bank: dest_bank.to_string(),
        account_to_debit: src_account.to_string(),
        account_to_credit: dest_account.to_string(),
        name_to_debit: src_name.to_string(),
        name_to_credit: dest_name.to_string(),
        amount: amount.to_string(),
        narration: narration.to_string(),
        callback_url: callback_url.to_string(),
    }
}

/// Builds the FTC (credit leg) request: direction is swapped relative to
/// FTD — origin is the destination bank, debit/credit accounts stay pinned
/// to src/dest respectively.
#[allow(clippy::too_many_arguments)]
pub fn build_ftc_request(
    cfg: &GatewayConfig,
    session_id: &str,
    tracking_number: &str,
    src_bank: &str,
    src_account: &str,
    src_name: &str,
    dest_bank: &str,
    dest_account: &str,
    dest_name: &str,
    amount: &str,
    narration: &str,
    callback_url: &str,
) -> LegRequest {
    LegRequest {
        date_time: format_gateway_timestamp(Utc::now()),
        session_id: session_id.to_string(),
        tracking_number: tracking_number.to_string(),
        function_code: cfg.ftc_function_code.clone(),
        channel_code: cfg.channel_code.clone(),
        origin_bank: dest_bank.to_string(),
        dest_bank: src_bank.to_string(),
        account_to_debit: src_account.to_string(),
        account_to_credit: dest_account.to_string(),
        name_to_debit: src_name.to_string(),
        name_to_credit: dest_name.to_string(),
        amount: amount.to_string(),
        narration: narration.to_string(),
        callback_url: callback_url.to_string(),
    }
}

/// Builds the Reversal request: a fully mirrored FTD — every src/dest
/// account, bank, and name is swapped, narration is prefixed.
#[allow(clippy::too_many_arguments)]
pub fn build_reversal_request(
    cfg: &GatewayConfig,
    session_id: &str,
    tracking_number: &str,
    src_bank: &str,
    src_account: &str,
    src_name: &str,
    dest_bank: &str,
    dest_account: &str,
    dest_name: &str,
    amount: &str,
    narration: &str,
    callback_url: &str,
) -> LegRequest {
    LegRequest {
        date_time: format_gateway_timestamp(Utc::now()),
        session_id: session_id.to_string(),
        tracking_number: tracking_number.to_string(),
        function_code: cfg.ftd_function_code.clone(),
        channel_code: cfg.channel_code.clone(),
        origin_bank: dest_bank.to_string(),
        dest_bank: src_bank.to_string(),
        account_to_debit: dest_account.to_string(),
        account_to_credit: src_account.to_string(),
        name_to_debit: dest_name.to_string(),
        name_to_credit: src_name.to_string(),
        amount: amount.to_string(),
        narration: format!("REVERSAL: {narration}"),
        callback_url: callback_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            nec_url: "https://gateway.local/nec".into(),
            ftd_url: "https://gateway.local/ftd".into(),
            ftc_url: "https://gateway.local/ftc".into(),
            tsq_url: "https://gateway.local/tsq".into(),
            channel_code: "001".into(),
            nec_function_code: "230".into(),
            ftd_function_code: "241".into(),
            ftc_function_code: "240".into(),
            tsq_function_code: "230".into(),
            request_timeout_sec: 30,
        }
    }

    #[test]
    fn ftd_direction_debits_src_credits_dest() {
        let cfg = test_config();
        let req = build_ftd_request(
            &cfg, "SES1", "TRK1", "300307", "1111111111", "Alice", "300304", "2222222222", "Bob",
            "000000100050", "payment", "https://cb.local",
        );
        assert_eq!(req.origin_bank, "300307");
        assert_eq!(req.dest_bank, "300304");
        assert_eq!(req.account_to_debit, "1111111111");
        assert_eq!(req.account_to_credit, "2222222222");
    }

    #[test]
    fn ftc_direction_is_swapped_from_ftd() {
        let cfg = test_config();
        let req = build_ftc_request(
            &cfg, "SES2", "TRK2", "300307", "1111111111", "Alice", "300304", "2222222222", "Bob",
            "000000100050", "payment", "https://cb.local",
        );
        assert_eq!(req.origin_bank, "300304");
        assert_eq!(req.dest_bank, "300307");
        // debit/credit accounts stay pinned to src/dest regardless of direction
        assert_eq!(req.account_to_debit, "1111111111");
        assert_eq!(req.account_to_credit, "2222222222");
    }

    #[test]
    fn reversal_fully_mirrors_ftd() {
        let cfg = test_config();
        let req = build_reversal_request(
            &cfg, "SES3", "TRK3", "300307", "1111111111", "Alice", "300304", "2222222222", "Bob",
            "000000100050", "payment", "https://cb.local",
        );
        assert_eq!(req.origin_bank, "300304");
        assert_eq!(req.dest_bank, "300307");
        assert_eq!(req.account_to_debit, "2222222222");
        assert_eq!(req.account_to_credit, "1111111111");
        assert_eq!(req.name_to_debit, "Bob");
        assert_eq!(req.name_to_credit, "Alice");
        assert_eq!(req.narration, "REVERSAL: payment");
        assert_eq!(req.function_code, cfg.ftd_function_code);
    }

    #[test]
    fn session_and_tracking_pairs_differ_across_legs() {
        let a = crate::ids::mint_correlation_pair();
        let b = crate::ids::mint_correlation_pair();
        let c = crate::ids::mint_correlation_pair();
        assert_ne!(a.session_id, b.session_id);
        assert_ne!(b.session_id, c.session_id);
        assert_ne!(a.session_id, c.session_id);
    }
}
