//! Error types for the credit ledger.

use crate::event::UpstreamType;
use crate::ids::IdError;
use crate::kind::CreditKind;
use crate::money::Credits;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
///
/// Validation, duplicate and insufficiency errors are raised before any
/// balance is mutated, so a failed operation leaves no partial state once
/// its transaction is rolled back.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The request is malformed (negative amount, missing note, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// An event with the same idempotency key already exists.
    #[error("duplicate transaction: {upstream_type}/{upstream_tx_id}")]
    DuplicateTransaction {
        /// Source of the request.
        upstream_type: UpstreamType,
        /// Caller supplied idempotency key.
        upstream_tx_id: String,
    },

    /// The payer's three credit kinds together cannot cover an expense.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Spendable balance across all kinds.
        available: Credits,
        /// Amount the expense needed.
        required: Credits,
    },

    /// A single credit kind cannot cover a deduction.
    #[error("insufficient {kind} balance: available={available}, required={required}")]
    InsufficientBalance {
        /// Kind being deducted.
        kind: CreditKind,
        /// Current balance of that kind.
        available: Credits,
        /// Amount the deduction needed.
        required: Credits,
    },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record (`account`, `agent`, `event`, `skill`).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl LedgerError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// A stored string did not name any variant of an enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}
