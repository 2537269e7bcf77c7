//! Database schema definitions.
//!
//! This module names the tables used by the PostgreSQL backend and embeds
//! the migrations that create them. Money columns are `NUMERIC(22,4)`.

/// Table names.
pub mod table {
    /// One row per `(owner_type, owner_id)`.
    pub const CREDIT_ACCOUNTS: &str = "credit_accounts";

    /// Audit records; unique on `(upstream_type, upstream_tx_id)`.
    pub const CREDIT_EVENTS: &str = "credit_events";

    /// Ledger lines, one per account touched by an event.
    pub const CREDIT_TRANSACTIONS: &str = "credit_transactions";

    /// Per-agent daily free income counters.
    pub const AGENT_QUOTAS: &str = "agent_quotas";
}

/// Returns all table names in creation order.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        table::CREDIT_ACCOUNTS,
        table::CREDIT_EVENTS,
        table::CREDIT_TRANSACTIONS,
        table::AGENT_QUOTAS,
    ]
}

/// Embedded migrations for the PostgreSQL backend.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
