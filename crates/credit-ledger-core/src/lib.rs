//! Core types for the credit ledger.
//!
//! This crate provides the foundational types used throughout the ledger:
//!
//! - **Money**: `Credits`, a 4-decimal fixed-point amount
//! - **Credit kinds**: `CreditKind`, `KindAmounts`
//! - **Identifiers**: `AccountId`, `EventId`, `TransactionId`, `UserId`, `AgentId`
//! - **Accounts**: `CreditAccount`, `OwnerType`
//! - **Audit records**: `CreditEvent`, `CreditTransaction`
//! - **Fees**: `FeeQuote`, `FeeSplit`
//! - **Pricing**: `PaymentSettings`, `PricingConfig`, `SkillPrice`, `AgentBilling`
//!
//! # Credit Kinds
//!
//! Every balance is held in three kinds, consumed in a fixed order:
//!
//! 1. `free_credits`: refilled hourly up to a quota
//! 2. `reward_credits`: promotional grants
//! 3. `credits`: permanent, paid-for credits
//!
//! Nothing in this crate touches storage; account mutations are pure and the
//! service crate persists them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
mod macros;

pub mod account;
pub mod error;
pub mod event;
pub mod fees;
pub mod ids;
pub mod kind;
pub mod money;
pub mod pricing;
pub mod transaction;

pub use account::{sinks, CreditAccount, DeductionPolicy, OwnerType};
pub use error::{LedgerError, Result, UnknownVariant};
pub use event::{AmountSplit, CreditEvent, Direction, EventType, RewardType, UpstreamType};
pub use fees::{FeeQuote, FeeSplit};
pub use ids::{AccountId, AgentId, EventId, IdError, TransactionId, UserId};
pub use kind::{CreditKind, KindAmounts};
pub use money::Credits;
pub use pricing::{
    AgentBilling, ApiKeyProvider, PaymentSettings, PricingConfig, SkillPrice,
    DEFAULT_SKILL_CALL_PRICE, DEFAULT_SKILL_CALL_SELF_KEY_PRICE,
};
pub use transaction::{CreditDebit, CreditTransaction, TransactionType};
