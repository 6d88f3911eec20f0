//! Domain types shared across the transaction lifecycle engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `NEC` is a synchronous name lookup, `FT` drives the full debit/credit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Nec,
    Ft,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Nec => "NEC",
            TransactionType::Ft => "FT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NEC" => Some(TransactionType::Nec),
            "FT" => Some(TransactionType::Ft),
            _ => None,
        }
    }
}

/// The transaction state machine. Edges allowed between variants are enforced
/// by [`crate::state_machine`], not by this enum itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Initiated,
    NecPending,
    NecSuccess,
    NecFailed,
    FtdPending,
    FtdTsq,
    FtdSuccess,
    FtdFailed,
    FtcPending,
    FtcTsq,
    FtcSuccess,
    FtcFailed,
    ReversalPending,
    ReversalSuccess,
    ReversalFailed,
    Completed,
    Failed,
    Timeout,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "INITIATED",
            TransactionStatus::NecPending => "NEC_PENDING",
            TransactionStatus::NecSuccess => "NEC_SUCCESS",
            TransactionStatus::NecFailed => "NEC_FAILED",
            TransactionStatus::FtdPending => "FTD_PENDING",
            TransactionStatus::FtdTsq => "FTD_TSQ",
            TransactionStatus::FtdSuccess => "FTD_SUCCESS",
            TransactionStatus::FtdFailed => "FTD_FAILED",
            TransactionStatus::FtcPending => "FTC_PENDING",
            TransactionStatus::FtcTsq => "FTC_TSQ",
            TransactionStatus::FtcSuccess => "FTC_SUCCESS",
            TransactionStatus::FtcFailed => "FTC_FAILED",
            TransactionStatus::ReversalPending => "REVERSAL_PENDING",
            TransactionStatus::ReversalSuccess => "REVERSAL_SUCCESS",
            TransactionStatus::ReversalFailed => "REVERSAL_FAILED",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "INITIATED" => TransactionStatus::Initiated,
            "NEC_PENDING" => TransactionStatus::NecPending,
            "NEC_SUCCESS" => TransactionStatus::NecSuccess,
            "NEC_FAILED" => TransactionStatus::NecFailed,
            "FTD_PENDING" => TransactionStatus::FtdPending,
            "FTD_TSQ" => TransactionStatus::FtdTsq,
            "FTD_SUCCESS" => TransactionStatus::FtdSuccess,
            "FTD_FAILED" => TransactionStatus::FtdFailed,
            "FTC_PENDING" => TransactionStatus::FtcPending,
            "FTC_TSQ" => TransactionStatus::FtcTsq,
            "FTC_SUCCESS" => TransactionStatus::FtcSuccess,
            "FTC_FAILED" => TransactionStatus::FtcFailed,
            "REVERSAL_PENDING" => TransactionStatus::ReversalPending,
            "REVERSAL_SUCCESS" => TransactionStatus::ReversalSuccess,
            "REVERSAL_FAILED" => TransactionStatus::ReversalFailed,
            "COMPLETED" => TransactionStatus::Completed,
            "FAILED" => TransactionStatus::Failed,
            "TIMEOUT" => TransactionStatus::Timeout,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Timeout
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The master transaction record. Mirrors the `transactions` table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub reference_number: String,
    pub session_id: String,
    pub tracking_number: String,

    pub transaction_type: TransactionType,
    pub institution_id: Uuid,
    pub credential_id: Uuid,

    pub src_bank_code: String,
    pub src_account_number: String,
    pub src_account_name: String,
    pub dest_bank_code: String,
    pub dest_account_number: String,
    pub dest_account_name: String,

    pub amount: Decimal,
    pub narration: String,
    pub callback_url: Option<String>,

    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_at: DateTime<Utc>,

    pub nec_action_code: Option<String>,
    pub ftd_action_code: Option<String>,
    pub ftc_action_code: Option<String>,
    pub reversal_action_code: Option<String>,

    pub ftc_session_id: Option<String>,
    pub ftc_tracking_number: Option<String>,
    pub reversal_session_id: Option<String>,
    pub reversal_tracking_number: Option<String>,

    pub tsq_required: bool,
    pub tsq_next_attempt_at: Option<DateTime<Utc>>,
    pub tsq_attempts: i32,

    pub reversal_required: bool,
    pub reversal_attempts: i32,

    pub client_callback_sent: bool,
    pub client_callback_sent_at: Option<DateTime<Utc>>,

    pub payee_name: Option<String>,
}

/// Which correlation pair a TSQ task is reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsqType {
    Ftd,
    Ftc,
    Reversal,
}

impl TsqType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TsqType::Ftd => "FTD",
            TsqType::Ftc => "FTC",
            TsqType::Reversal => "REVERSAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FTD" => Some(TsqType::Ftd),
            "FTC" => Some(TsqType::Ftc),
            "REVERSAL" => Some(TsqType::Reversal),
            _ => None,
        }
    }
}

/// A due reconciliation task against the Gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsqTask {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub tsq_type: TsqType,
    pub target_session_id: String,
    pub target_tracking_number: String,
    pub scheduled_for: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// Gateway event log entry: one row per request/response leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEventType {
    NecRequest,
    FtdRequest,
    FtdCallback,
    FtcRequest,
    FtcCallback,
    ReversalRequest,
    ReversalCallback,
    FtdTsqResponse,
    FtcTsqResponse,
    ReversalTsqResponse,
}

impl GatewayEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEventType::NecRequest => "NEC_REQUEST",
            GatewayEventType::FtdRequest => "FTD_REQUEST",
            GatewayEventType::FtdCallback => "FTD_CALLBACK",
            GatewayEventType::FtcRequest => "FTC_REQUEST",
            GatewayEventType::FtcCallback => "FTC_CALLBACK",
            GatewayEventType::ReversalRequest => "REVERSAL_REQUEST",
            GatewayEventType::ReversalCallback => "REVERSAL_CALLBACK",
            GatewayEventType::FtdTsqResponse => "FTD_TSQ_RESPONSE",
            GatewayEventType::FtcTsqResponse => "FTC_TSQ_RESPONSE",
            GatewayEventType::ReversalTsqResponse => "REVERSAL_TSQ_RESPONSE",
        }
    }
}

/// Canonical event sequence numbers. A few are fixed (FTC request = 5,
/// reversal request = 7, TSQ = 99); the rest are assigned in leg order.
pub mod event_sequence {
    pub const NEC_REQUEST: i32 = 1;
    pub const FTD_REQUEST: i32 = 2;
    pub const FTD_CALLBACK: i32 = 3;
    pub const FTC_REQUEST: i32 = 5;
    pub const FTC_CALLBACK: i32 = 6;
    pub const REVERSAL_REQUEST: i32 = 7;
    pub const REVERSAL_CALLBACK: i32 = 8;
    pub const TSQ_BASE: i32 = 99;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub event_type: GatewayEventType,
    pub event_sequence: i32,
    pub session_id: String,
    pub tracking_number: String,
    pub function_code: String,
    pub request_payload: Option<serde_json::Value>,
    pub response_payload: Option<serde_json::Value>,
    pub action_code: Option<String>,
    pub status_label: Option<String>,
    pub request_sent_at: DateTime<Utc>,
    pub response_received_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayCallbackStatus {
    Pending,
    Processed,
    Ignored,
    Error,
}

impl GatewayCallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayCallbackStatus::Pending => "PENDING",
            GatewayCallbackStatus::Processed => "PROCESSED",
            GatewayCallbackStatus::Ignored => "IGNORED",
            GatewayCallbackStatus::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(GatewayCallbackStatus::Pending),
            "PROCESSED" => Some(GatewayCallbackStatus::Processed),
            "IGNORED" => Some(GatewayCallbackStatus::Ignored),
            "ERROR" => Some(GatewayCallbackStatus::Error),
            _ => None,
        }
    }
}

/// Durable record of every inbound Gateway callback, raw payload preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub id: Uuid,
    pub session_id: String,
    pub function_code: Option<String>,
    pub action_code: Option<String>,
    pub status_code: Option<String>,
    pub raw_payload: serde_json::Value,
    pub source_ip: Option<String>,
    pub status: GatewayCallbackStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCallbackStatus {
    Pending,
    Failed,
    Delivered,
}

impl ClientCallbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientCallbackStatus::Pending => "PENDING",
            ClientCallbackStatus::Failed => "FAILED",
            ClientCallbackStatus::Delivered => "DELIVERED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ClientCallbackStatus::Pending),
            "FAILED" => Some(ClientCallbackStatus::Failed),
            "DELIVERED" => Some(ClientCallbackStatus::Delivered),
            _ => None,
        }
    }
}

/// Outgoing webhook delivery record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCallback {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub target_url: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub status: ClientCallbackStatus,
    pub last_response_status: Option<i32>,
    pub last_response_body: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Outcome label reported to the client in the terminal webhook body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientOutcome {
    Successful,
    Failed,
    Timeout,
}

impl ClientOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientOutcome::Successful => "SUCCESSFUL",
            ClientOutcome::Failed => "FAILED",
            ClientOutcome::Timeout => "TIMEOUT",
        }
    }
}

/// Severity tier for `AuditLog` rows; `Critical` corresponds to reversal
/// failures and other lost-funds scenarios that need operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "INFO",
            AuditSeverity::Warning => "WARNING",
            AuditSeverity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub severity: AuditSeverity,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
