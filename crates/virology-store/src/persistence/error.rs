use serde::Serialize;
use virology_core::db::DatabaseError;

use crate::storage::{ConditionFailure, TransactWriteError};

/// Failures that end the current request.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Persistence of test order failed after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// A stored record lacks a field every writer sets.
    #[error("Required field missing: {0}")]
    RequiredFieldMissing(&'static str),

    #[error("Invalid value {value:?} in stored field {field}")]
    InvalidField { field: &'static str, value: String },

    #[error("Transaction conflict: {0}")]
    TransactionConflict(ConditionFailure),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<TransactWriteError> for PersistenceError {
    fn from(e: TransactWriteError) -> Self {
        match e {
            TransactWriteError::Cancelled(reason) => Self::TransactionConflict(reason),
            TransactWriteError::Database(e) => Self::Database(e),
        }
    }
}

/// Expected outcomes of recording a result. Callers branch on these; they are
/// never raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultPersistOutcome {
    Success,
    OrderNotFound,
    TransactionFailed,
}
