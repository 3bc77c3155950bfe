//! Error taxonomy
//!
//! Every operation fails with a [`BountyError`]. The edge layer only needs
//! [`BountyError::kind`] to pick a status code; the message is meant for humans.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{BountyStatus, TransactionStatus};

pub type Result<T> = std::result::Result<T, BountyError>;

/// Stable machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    AlreadyAssigned,
    AlreadyPaid,
    InvalidState,
    InvalidTransactionStatus,
    InsufficientBudget,
    NoAcceptedProof,
    NoAssignee,
    NoTransaction,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::AlreadyAssigned => "ALREADY_ASSIGNED",
            ErrorKind::AlreadyPaid => "ALREADY_PAID",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::InvalidTransactionStatus => "INVALID_TRANSACTION_STATUS",
            ErrorKind::InsufficientBudget => "INSUFFICIENT_BUDGET",
            ErrorKind::NoAcceptedProof => "NO_ACCEPTED_PROOF",
            ErrorKind::NoAssignee => "NO_ASSIGNEE",
            ErrorKind::NoTransaction => "NO_TRANSACTION",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Error)]
pub enum BountyError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing actor identity")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bounty {0} is already assigned")]
    AlreadyAssigned(Uuid),

    #[error("Bounty {0} has already been paid")]
    AlreadyPaid(Uuid),

    #[error("Cannot {action} a bounty in status {status}")]
    InvalidState {
        status: BountyStatus,
        action: &'static str,
    },

    #[error("Bounty is in terminal status {0}")]
    TerminalState(BountyStatus),

    #[error("Transaction is {0}, only PENDING transactions can be updated")]
    InvalidTransactionStatus(TransactionStatus),

    #[error("Insufficient budget: {required} required, {available} available")]
    InsufficientBudget { available: u64, required: u64 },

    #[error("Bounty has no accepted proof")]
    NoAcceptedProof,

    #[error("Bounty has no assignee")]
    NoAssignee,

    #[error("No transaction found for bounty {0}")]
    NoTransaction(Uuid),

    /// Ledger invariant broken or counter overflow. Indicates a bug.
    #[error("Ledger invariant violated: {0}")]
    Invariant(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BountyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BountyError::Validation(_) => ErrorKind::ValidationError,
            BountyError::Unauthorized => ErrorKind::Unauthorized,
            BountyError::Forbidden(_) => ErrorKind::Forbidden,
            BountyError::NotFound { .. } => ErrorKind::NotFound,
            BountyError::Conflict(_) => ErrorKind::Conflict,
            BountyError::AlreadyAssigned(_) => ErrorKind::AlreadyAssigned,
            BountyError::AlreadyPaid(_) => ErrorKind::AlreadyPaid,
            BountyError::InvalidState { .. } | BountyError::TerminalState(_) => {
                ErrorKind::InvalidState
            }
            BountyError::InvalidTransactionStatus(_) => ErrorKind::InvalidTransactionStatus,
            BountyError::InsufficientBudget { .. } => ErrorKind::InsufficientBudget,
            BountyError::NoAcceptedProof => ErrorKind::NoAcceptedProof,
            BountyError::NoAssignee => ErrorKind::NoAssignee,
            BountyError::NoTransaction(_) => ErrorKind::NoTransaction,
            BountyError::Invariant(_)
            | BountyError::Storage(_)
            | BountyError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Non-recoverable: the caller must not retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BountyError::Invariant(_))
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BountyError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BountyError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        BountyError::Forbidden(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state_reports_invalid_state() {
        let err = BountyError::TerminalState(BountyStatus::Paid);
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.kind().code(), "INVALID_STATE");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invariant_is_fatal_internal() {
        let err = BountyError::Invariant("reserved underflow".to_string());
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_kind_serializes_as_code() {
        for kind in [
            ErrorKind::InsufficientBudget,
            ErrorKind::AlreadyPaid,
            ErrorKind::NoAcceptedProof,
            ErrorKind::InvalidTransactionStatus,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.code().to_string()));
        }
    }

    #[test]
    fn test_messages() {
        let err = BountyError::InsufficientBudget {
            available: 10,
            required: 50,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient budget: 50 required, 10 available"
        );
        let err = BountyError::not_found("bounty", "abc");
        assert_eq!(err.to_string(), "bounty abc not found");
    }
}
