use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db::traits::StorageError,
    db_types::AddressError,
    ledger::{OracleError, ReleaseError},
};

/// Errors that end a trade lifecycle request. The trade is left untouched when any of these is returned.
#[derive(Debug, Clone, Error)]
pub enum TradeFlowError {
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Operation not allowed in the current trade state: {0}")]
    InvalidState(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StorageError> for TradeFlowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(s) => Self::NotFound(s),
            StorageError::StaleUpdate(s) => Self::InvalidState(s),
            StorageError::Duplicate(s) | StorageError::DatabaseError(s) => Self::DatabaseError(s),
        }
    }
}

impl From<AddressError> for TradeFlowError {
    fn from(e: AddressError) -> Self {
        Self::ValidationError(e.to_string())
    }
}

impl From<ConversationApiError> for TradeFlowError {
    fn from(e: ConversationApiError) -> Self {
        match e {
            ConversationApiError::ValidationError(s) => Self::ValidationError(s),
            ConversationApiError::Forbidden(s) => Self::Forbidden(s),
            ConversationApiError::NotFound(s) => Self::NotFound(s),
            ConversationApiError::DatabaseError(s) => Self::DatabaseError(s),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConversationApiError {
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StorageError> for ConversationApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(s) => Self::NotFound(s),
            StorageError::StaleUpdate(s) | StorageError::Duplicate(s) | StorageError::DatabaseError(s) => {
                Self::DatabaseError(s)
            },
        }
    }
}

impl From<AddressError> for ConversationApiError {
    fn from(e: AddressError) -> Self {
        Self::ValidationError(e.to_string())
    }
}

/// Non-fatal outcomes of the deposit and settlement steps. They are reported next to the (unchanged) trade so that the
/// client can fix the input or simply retry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum AdvisoryError {
    #[error("The deposit could not be verified: {0}")]
    VerificationFailed(String),
    #[error("The release endpoint refused the settlement: {0}")]
    SettlementFailed(String),
    #[error("An upstream service is unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl From<OracleError> for AdvisoryError {
    fn from(e: OracleError) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}

impl From<ReleaseError> for AdvisoryError {
    fn from(e: ReleaseError) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}
