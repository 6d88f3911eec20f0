//! Wire-level request/response shapes for the Gateway surface.
//!
//! Inbound callback fields may arrive in either camel or snake form, so
//! [`InboundCallback`] accepts both spellings per field via `serde(alias)`.

use serde::{Deserialize, Serialize};

/// A single leg request (FTD, FTC, or Reversal all share this shape; only
/// the direction of the account/bank fields differs between them).
#[derive(Debug, Clone, Serialize)]
pub struct LegRequest {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "trackingNumber")]
    pub tracking_number: String,
    #[serde(rename = "functionCode")]
    pub function_code: String,
    #[serde(rename = "channelCode")]
    pub channel_code: String,
    #[serde(rename = "originBank")]
    pub origin_bank: String,
    #[serde(rename = "destBank")]
    pub dest_bank: String,
    #[serde(rename = "accountToDebit")]
    pub account_to_debit: String,
    #[serde(rename = "accountToCredit")]
    pub account_to_credit: String,
    #[serde(rename = "nameToDebit")]
    pub name_to_debit: String,
    #[serde(rename = "nameToCredit")]
    pub name_to_credit: String,
    pub amount: String,
    pub narration: String,
    #[serde(rename = "callbackUrl")]
    pub callback_url: String,
}

/// Name-enquiry request: no amount leg, same correlation/bank fields.
#[derive(Debug, Clone, Serialize)]
pub struct NecRequest {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "trackingNumber")]
    pub tracking_number: String,
    #[serde(rename = "functionCode")]
    pub function_code: String,
    #[serde(rename = "channelCode")]
    pub channel_code: String,
    #[serde(rename = "originBank")]
    pub origin_bank: String,
    #[serde(rename = "destBank")]
    pub dest_bank: String,
    #[serde(rename = "accountNumber")]
    pub account_number: String,
}

/// Status-query request: references the original leg's correlation pair.
#[derive(Debug, Clone, Serialize)]
pub struct TsqRequest {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "trackingNumber")]
    pub tracking_number: String,
    #[serde(rename = "functionCode")]
    pub function_code: String,
    #[serde(rename = "channelCode")]
    pub channel_code: String,
}

/// Gateway's parsed response, uniform across NEC/FTD/FTC/Reversal/TSQ.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub action_code: Option<String>,
    pub status_code: Option<String>,
    pub approval_code: Option<String>,
    pub payee_name: Option<String>,
    pub raw_response: serde_json::Value,
    pub duration_ms: i64,
}

/// The set of action codes that mandate TSQ reconciliation rather than an
/// immediate success/failure verdict.
pub fn is_inconclusive(action_code: Option<&str>) -> bool {
    matches!(action_code, None | Some("") | Some("909") | Some("912") | Some("990"))
}

pub fn is_success(action_code: Option<&str>) -> bool {
    action_code == Some("000")
}

/// Raw inbound Gateway callback, accepting camelCase or snake_case per
/// field since the Gateway is not consistent about it.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundCallback {
    #[serde(alias = "sessionId", alias = "session_id")]
    pub session_id: String,

    #[serde(alias = "trackingNumber", alias = "tracking_number", default)]
    pub tracking_number: Option<String>,

    #[serde(alias = "functionCode", alias = "function_code", default)]
    pub function_code: Option<String>,

    #[serde(alias = "actionCode", alias = "action_code", default)]
    pub action_code: Option<String>,

    #[serde(alias = "statusCode", alias = "status_code", default)]
    pub status_code: Option<String>,

    #[serde(alias = "approvalCode", alias = "approval_code", default)]
    pub approval_code: Option<String>,

    #[serde(alias = "nameToCredit", alias = "name_to_credit", default)]
    pub name_to_credit: Option<String>,
}
