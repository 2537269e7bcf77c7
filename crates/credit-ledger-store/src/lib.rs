//! Storage layer for the credit ledger.
//!
//! This crate persists accounts, events, transactions and per-agent free
//! income counters behind two traits:
//!
//! - [`Store`] opens transactions.
//! - [`LedgerTx`] is one open transaction. Every read of an account through
//!   it locks the row until commit or rollback, so concurrent operations on
//!   the same account serialize.
//!
//! Nothing is visible to other transactions until [`LedgerTx::commit`].
//! Dropping a transaction without committing discards it.
//!
//! # Backends
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`, with embedded migrations.
//! - [`MemoryStore`]: a single-writer in-memory store for tests and tools.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger_core::{CreditAccount, OwnerType};
//! use credit_ledger_store::{MemoryStore, Store};
//!
//! # async fn demo() -> credit_ledger_store::Result<()> {
//! let store = MemoryStore::new();
//! let mut tx = store.begin().await?;
//! let account = tx
//!     .insert_account(&CreditAccount::new(OwnerType::User, "u1"))
//!     .await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::{EventQuery, SortOrder, TransactionQuery};

use async_trait::async_trait;
use chrono::NaiveDate;
use credit_ledger_core::{
    AccountId, AgentId, CreditAccount, CreditEvent, CreditTransaction, Credits, EventId,
    OwnerType, UpstreamType,
};

/// Free credits an agent's calls consumed on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentQuota {
    /// Agent id.
    pub agent_id: AgentId,
    /// Free credits consumed on `day`.
    pub free_income_daily: Credits,
    /// Day the counter belongs to (UTC).
    pub day: NaiveDate,
}

/// Opens ledger transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;
}

/// One open ledger transaction.
#[async_trait]
pub trait LedgerTx: Send {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by owner, locking it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(
        &mut self,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> Result<Option<CreditAccount>>;

    /// Get an account by id, locking it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account_by_id(&mut self, account_id: &AccountId) -> Result<Option<CreditAccount>>;

    /// Insert `account` unless its owner already has one, and return the
    /// stored row, locked.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_account(&mut self, account: &CreditAccount) -> Result<CreditAccount>;

    /// Write back balances, quota and timestamps of an existing account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    async fn update_account(&mut self, account: &CreditAccount) -> Result<()>;

    /// Accounts with a positive refill amount whose free credits are below quota.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_refill_candidates(&mut self) -> Result<Vec<CreditAccount>>;

    // =========================================================================
    // Event Operations
    // =========================================================================

    /// Find the event holding an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_event_by_upstream(
        &mut self,
        upstream_type: UpstreamType,
        upstream_tx_id: &str,
    ) -> Result<Option<CreditEvent>>;

    /// Find the oldest event with `upstream_tx_id`, whatever its upstream type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_event_by_upstream_tx_id(
        &mut self,
        upstream_tx_id: &str,
    ) -> Result<Option<CreditEvent>>;

    /// Get an event by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_event(&mut self, event_id: &EventId) -> Result<Option<CreditEvent>>;

    /// Get several events by id, in no particular order; missing ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_events(&mut self, event_ids: &[EventId]) -> Result<Vec<CreditEvent>>;

    /// Insert an event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateEvent` if the idempotency key is taken.
    async fn insert_event(&mut self, event: &CreditEvent) -> Result<()>;

    /// Replace an event's note and return the updated event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the event doesn't exist.
    async fn update_event_note(
        &mut self,
        event_id: &EventId,
        note: Option<&str>,
    ) -> Result<CreditEvent>;

    /// List events matching `query`, in its scan order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_events(&mut self, query: &EventQuery) -> Result<Vec<CreditEvent>>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Insert ledger lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_transactions(&mut self, transactions: &[CreditTransaction]) -> Result<()>;

    /// List ledger lines matching `query`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions(&mut self, query: &TransactionQuery)
        -> Result<Vec<CreditTransaction>>;

    /// All ledger lines of one event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions_by_event(
        &mut self,
        event_id: &EventId,
    ) -> Result<Vec<CreditTransaction>>;

    // =========================================================================
    // Agent Quota Operations
    // =========================================================================

    /// Add to an agent's free income for `day`, resetting the counter when
    /// the stored day differs. Returns the new counter value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn add_agent_free_income(
        &mut self,
        agent_id: &AgentId,
        amount: Credits,
        day: NaiveDate,
    ) -> Result<Credits>;

    /// Current free income counter of an agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_agent_quota(&mut self, agent_id: &AgentId) -> Result<Option<AgentQuota>>;

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Make every write of this transaction visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; nothing is applied in that case.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to roll back.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
