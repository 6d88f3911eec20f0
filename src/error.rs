//! Error types for the transaction lifecycle engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("duplicate reference number: {0}")]
    DuplicateReference(String),

    #[error("unknown participant bank code: {0}")]
    InvalidParticipant(String),

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: crate::types::TransactionStatus,
        to: crate::types::TransactionStatus,
    },

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("gateway transport error: {0}")]
    GatewayTransport(#[from] reqwest::Error),

    #[error("gateway rejected request: action_code={action_code}")]
    GatewayReject { action_code: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
