//! Listing filters shared by every backend.

use chrono::{DateTime, Utc};

use credit_ledger_core::{
    AccountId, CreditDebit, CreditEvent, CreditTransaction, Direction, EventId, EventType,
    TransactionId, TransactionType,
};

/// Direction of an id-ordered scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first; the cursor is exclusive from below.
    Ascending,
    /// Newest first; the cursor is exclusive from above.
    #[default]
    Descending,
}

/// Filter for event listings.
///
/// Every set field must match. `limit` is passed through as-is: callers
/// that want to detect a further page ask for one row more than they return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Primary account.
    pub account_id: Option<AccountId>,
    /// Account that received an agent fee greater than zero.
    pub fee_agent_account: Option<AccountId>,
    /// Income or expense.
    pub direction: Option<Direction>,
    /// Event type.
    pub event_type: Option<EventType>,
    /// Inclusive lower bound on `created_at`.
    pub start_at: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub end_at: Option<DateTime<Utc>>,
    /// Continue after this id (in scan order).
    pub cursor: Option<EventId>,
    /// Scan order.
    pub order: SortOrder,
    /// Maximum rows returned.
    pub limit: usize,
}

impl EventQuery {
    /// Whether `event` passes every filter, cursor included.
    #[must_use]
    pub fn matches(&self, event: &CreditEvent) -> bool {
        if self.account_id.is_some_and(|id| event.account_id != id) {
            return false;
        }
        if let Some(fee_account) = self.fee_agent_account {
            if event.fee_agent_account != Some(fee_account) || !event.fee_agent.amount.is_positive() {
                return false;
            }
        }
        if self.direction.is_some_and(|d| event.direction != d) {
            return false;
        }
        if self.event_type.is_some_and(|t| event.event_type != t) {
            return false;
        }
        if self.start_at.is_some_and(|start| event.created_at < start) {
            return false;
        }
        if self.end_at.is_some_and(|end| event.created_at >= end) {
            return false;
        }
        match (self.cursor, self.order) {
            (Some(cursor), SortOrder::Ascending) => event.id > cursor,
            (Some(cursor), SortOrder::Descending) => event.id < cursor,
            (None, _) => true,
        }
    }
}

/// Filter for one account's ledger lines, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Account whose lines are listed.
    pub account_id: AccountId,
    /// Accept only these types (any type when empty).
    pub tx_types: Vec<TransactionType>,
    /// Accept only this side.
    pub credit_debit: Option<CreditDebit>,
    /// Continue with ids below this one.
    pub cursor: Option<TransactionId>,
    /// Maximum rows returned.
    pub limit: usize,
}

impl TransactionQuery {
    /// All lines of `account_id`, newest first.
    #[must_use]
    pub fn for_account(account_id: AccountId, limit: usize) -> Self {
        Self {
            account_id,
            tx_types: Vec::new(),
            credit_debit: None,
            cursor: None,
            limit,
        }
    }

    /// Whether `tx` passes every filter, cursor included.
    #[must_use]
    pub fn matches(&self, tx: &CreditTransaction) -> bool {
        tx.account_id == self.account_id
            && (self.tx_types.is_empty() || self.tx_types.contains(&tx.tx_type))
            && self.credit_debit.map_or(true, |side| tx.credit_debit == side)
            && self.cursor.map_or(true, |cursor| tx.id < cursor)
    }
}
