//! Error types for credit ledger storage.

use credit_ledger_core::{LedgerError, UpstreamType};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain type.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The `(upstream_type, upstream_tx_id)` pair is already taken.
    #[error("duplicate event: {upstream_type}/{upstream_tx_id}")]
    DuplicateEvent {
        /// Source of the request.
        upstream_type: UpstreamType,
        /// Caller supplied idempotency key.
        upstream_tx_id: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEvent {
                upstream_type,
                upstream_tx_id,
            } => Self::DuplicateTransaction {
                upstream_type,
                upstream_tx_id,
            },
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Database(message) | StoreError::Serialization(message) => {
                Self::Storage(message)
            }
        }
    }
}
