//! Store error types.

use mcpfusion_core::error::{Categorized, ErrorCategory};
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("underlying engine error: {0}")]
    Engine(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found")]
    NotFound,

    #[error("ambiguous prefix: {0} matches more than one token")]
    AmbiguousPrefix(String),

    #[error("duplicate key")]
    DuplicateKey,

    #[error("on-disk schema version {on_disk} is newer than the {supported} this build supports")]
    UnsupportedSchemaVersion { on_disk: u32, supported: u32 },

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

impl Categorized for StoreError {
    fn category(&self) -> ErrorCategory {
        match self {
            StoreError::NotFound => ErrorCategory::Validation,
            _ => ErrorCategory::Store,
        }
    }
}

impl<T> From<sled::transaction::TransactionError<T>> for StoreError
where
    T: std::fmt::Display,
{
    fn from(value: sled::transaction::TransactionError<T>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(inner) => {
                StoreError::TransactionAborted(inner.to_string())
            }
            sled::transaction::TransactionError::Storage(e) => StoreError::Engine(e),
        }
    }
}
